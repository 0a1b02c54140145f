//! Parsed authentication configuration snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustls::RootCertStore;
use tracing::debug;

use super::descriptor::{
    AuthDescriptor, CLIENT_CA_KEY, REQUESTHEADER_ALLOWED_NAMES_KEY,
    REQUESTHEADER_CLIENT_CA_KEY, REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY,
    REQUESTHEADER_GROUP_HEADERS_KEY, REQUESTHEADER_USERNAME_HEADERS_KEY,
};
use crate::{Error, Result};

/// Immutable view of the authentication descriptor.
///
/// Built in one piece from a descriptor and replaced wholesale on update.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM bytes of the primary client CA.
    pub client_ca_bytes: Vec<u8>,
    /// PEM bytes of the CA trusted for front-proxy identity headers.
    pub requestheader_client_ca_bytes: Vec<u8>,
    /// Trust anchors parsed from both CA bundles; the handshake's client-CA set.
    pub cert_pool: Arc<RootCertStore>,
    /// Headers carrying the forwarded user name, in lookup order.
    pub user_headers: Vec<String>,
    /// Headers carrying forwarded group names.
    pub group_headers: Vec<String>,
    /// Header prefixes carrying forwarded extra attributes.
    pub extra_prefix_headers: Vec<String>,
    /// Client common names allowed to forward identity. Empty allows any.
    pub allowed_common_names: BTreeSet<String>,
}

impl AuthConfig {
    /// Parse a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CertificateParse`] if either non-empty CA bundle holds
    /// no certificate or a certificate that cannot be used as a trust anchor.
    /// Malformed header lists are not errors; see
    /// [`deserialize_string_slice`](super::descriptor::deserialize_string_slice).
    pub fn from_descriptor(descriptor: &AuthDescriptor) -> Result<Self> {
        let client_ca_bytes = descriptor.get(CLIENT_CA_KEY).as_bytes().to_vec();
        let requestheader_client_ca_bytes = descriptor
            .get(REQUESTHEADER_CLIENT_CA_KEY)
            .as_bytes()
            .to_vec();

        let mut pool = RootCertStore::empty();
        add_pem_bundle(&mut pool, &client_ca_bytes, CLIENT_CA_KEY)?;
        add_pem_bundle(
            &mut pool,
            &requestheader_client_ca_bytes,
            REQUESTHEADER_CLIENT_CA_KEY,
        )?;

        Ok(Self {
            client_ca_bytes,
            requestheader_client_ca_bytes,
            cert_pool: Arc::new(pool),
            user_headers: descriptor.get_list(REQUESTHEADER_USERNAME_HEADERS_KEY),
            group_headers: descriptor.get_list(REQUESTHEADER_GROUP_HEADERS_KEY),
            extra_prefix_headers: descriptor.get_list(REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY),
            allowed_common_names: descriptor
                .get_list(REQUESTHEADER_ALLOWED_NAMES_KEY)
                .into_iter()
                .collect(),
        })
    }

    /// Whether a client certificate with common name `name` may be trusted.
    #[must_use]
    pub fn validate_name(&self, name: &str) -> bool {
        self.allowed_common_names.is_empty() || self.allowed_common_names.contains(name)
    }

    /// Number of trust anchors in the client-CA pool.
    #[must_use]
    pub fn trust_anchor_count(&self) -> usize {
        self.cert_pool.len()
    }
}

/// Add every certificate of a PEM bundle to `pool`. Empty bundles are skipped.
fn add_pem_bundle(pool: &mut RootCertStore, pem: &[u8], field: &str) -> Result<usize> {
    if pem.iter().all(u8::is_ascii_whitespace) {
        return Ok(0);
    }

    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::CertificateParse(format!("{field}: {e}")))?;
    if certs.is_empty() {
        return Err(Error::CertificateParse(format!(
            "{field}: no PEM certificates found"
        )));
    }

    let count = certs.len();
    for cert in certs {
        pool.add(cert)
            .map_err(|e| Error::CertificateParse(format!("{field}: {e}")))?;
    }
    debug!(field, count, "Added CA certificates to client pool");
    Ok(count)
}
