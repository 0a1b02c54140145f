//! Peer certificate identity.
//!
//! Subject fields of the verified client leaf certificate. The common name is
//! what front-proxy authentication checks against the allowed names.

use serde::Serialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

/// Identity fields of a verified client certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerIdentity {
    /// Subject Common Name (CN).
    pub common_name: Option<String>,

    /// Subject Organisational Units (OU), in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub organizational_units: Vec<String>,

    /// SAN URI entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub san_uris: Vec<String>,

    /// SAN DNS entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub san_dns_names: Vec<String>,
}

impl PeerIdentity {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `Error::CertificateParse` if the certificate is malformed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::CertificateParse(format!("client certificate: {e}")))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);

        let organizational_units = cert
            .subject()
            .iter_organizational_unit()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::to_owned)
            .collect();

        let mut san_uris = Vec::new();
        let mut san_dns_names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::URI(uri) => san_uris.push((*uri).to_owned()),
                    GeneralName::DNSName(dns) => san_dns_names.push((*dns).to_owned()),
                    _ => {}
                }
            }
        }

        Ok(Self {
            common_name,
            organizational_units,
            san_uris,
            san_dns_names,
        })
    }

    /// Label for logs: CN, then first SAN URI, then `<unknown>`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.common_name
            .as_deref()
            .or_else(|| self.san_uris.first().map(String::as_str))
            .unwrap_or("<unknown>")
    }
}
