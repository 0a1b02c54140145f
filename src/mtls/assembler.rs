//! Per-handshake TLS server configuration.
//!
//! Every handshake gets a fresh `ServerConfig` built from whatever the auth
//! and TLS profile watchers hold at that moment. Nothing is cached between
//! handshakes, so a trust or cipher change applies to the next connection.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{CipherSuite, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use tracing::{debug, warn};

use crate::auth::AuthConfigWatch;
use crate::tls_profile::{TlsPolicy, TlsPolicyWatch, TlsVersion};
use crate::{Error, Result};

/// ALPN protocols offered, most preferred first.
pub const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2", b"http/1.1"];

/// What the client announced in its `ClientHello`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// SNI host name.
    pub server_name: Option<String>,
    /// Offered ALPN protocols.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Offered cipher suites.
    pub cipher_suites: Vec<CipherSuite>,
}

impl HandshakeInfo {
    /// Capture the relevant parts of a `ClientHello`.
    #[must_use]
    pub fn from_client_hello(hello: &ClientHello<'_>) -> Self {
        Self {
            server_name: hello.server_name().map(str::to_owned),
            alpn_protocols: hello
                .alpn()
                .map(|protocols| protocols.map(<[u8]>::to_vec).collect())
                .unwrap_or_default(),
            cipher_suites: hello.cipher_suites().to_vec(),
        }
    }
}

/// Supplies the serving certificate for a handshake.
pub trait CertificateSource: Send + Sync {
    /// Certificate chain and signing key to present.
    ///
    /// # Errors
    ///
    /// Any error refuses the connection.
    fn certificate(&self, hello: &HandshakeInfo) -> Result<Arc<CertifiedKey>>;
}

/// Resolver that always presents one already-chosen certificate.
#[derive(Debug)]
struct SingleCertResolver(Arc<CertifiedKey>);

impl ResolvesServerCert for SingleCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

/// Builds a `ServerConfig` for each handshake from the live snapshots.
pub struct TlsConfigAssembler {
    auth: Arc<dyn AuthConfigWatch>,
    tls: Arc<dyn TlsPolicyWatch>,
    certs: Arc<dyn CertificateSource>,
    provider: Arc<CryptoProvider>,
}

impl TlsConfigAssembler {
    /// Assemble with the aws-lc-rs crypto provider.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthConfigWatch>,
        tls: Arc<dyn TlsPolicyWatch>,
        certs: Arc<dyn CertificateSource>,
    ) -> Self {
        Self::with_provider(
            auth,
            tls,
            certs,
            Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        )
    }

    /// Assemble with a specific crypto provider. Policy ciphers the provider
    /// does not implement are ignored.
    #[must_use]
    pub fn with_provider(
        auth: Arc<dyn AuthConfigWatch>,
        tls: Arc<dyn TlsPolicyWatch>,
        certs: Arc<dyn CertificateSource>,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            auth,
            tls,
            certs,
            provider,
        }
    }

    /// The base crypto provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Build the configuration for one handshake.
    ///
    /// # Errors
    ///
    /// Fails, refusing the connection, if the certificate cannot be obtained,
    /// the client-CA pool is empty, or no policy cipher suite is usable.
    pub fn config_for_handshake(&self, hello: &HandshakeInfo) -> Result<Arc<ServerConfig>> {
        let auth = self.auth.auth_config();
        let policy = self.tls.cdi_tls_config();
        let certified_key = self.certs.certificate(hello)?;

        if auth.cert_pool.is_empty() {
            return Err(Error::Config("client CA pool is empty".to_owned()));
        }

        let provider = Arc::new(self.provider_for(&policy)?);
        let versions: Vec<&'static SupportedProtocolVersion> = protocol_versions(policy.min_version)
            .into_iter()
            .filter(|v| {
                provider
                    .cipher_suites
                    .iter()
                    .any(|s| s.version().version == v.version)
            })
            .collect();
        if versions.is_empty() {
            return Err(Error::Config(format!(
                "TLS profile {} has no cipher suite for {} or later",
                policy.profile, policy.min_version
            )));
        }

        let verifier = WebPkiClientVerifier::builder_with_provider(
            Arc::clone(&auth.cert_pool),
            Arc::clone(&provider),
        )
        .build()?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(Arc::new(SingleCertResolver(certified_key)));
        config.ignore_client_order = true;
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        debug!(
            server_name = hello.server_name.as_deref().unwrap_or(""),
            profile = %policy.profile,
            min_version = %policy.min_version,
            cipher_suites = config.crypto_provider().cipher_suites.len(),
            trust_anchors = auth.cert_pool.len(),
            "Assembled TLS config for handshake"
        );

        Ok(Arc::new(config))
    }

    /// The base provider restricted to the policy's suites, in policy order.
    fn provider_for(&self, policy: &TlsPolicy) -> Result<CryptoProvider> {
        let cipher_suites: Vec<SupportedCipherSuite> = policy
            .cipher_suites
            .iter()
            .filter_map(|wanted| {
                self.provider
                    .cipher_suites
                    .iter()
                    .find(|s| s.suite() == *wanted)
                    .copied()
            })
            .collect();

        if cipher_suites.is_empty() {
            warn!(
                profile = %policy.profile,
                "No cipher suite of the TLS policy is supported"
            );
            return Err(Error::Config(format!(
                "no usable cipher suite in TLS profile {}",
                policy.profile
            )));
        }

        Ok(CryptoProvider {
            cipher_suites,
            ..(*self.provider).clone()
        })
    }
}

/// Supported protocol versions at or above `min`. Versions below TLS 1.2 are
/// not implemented and clamp to TLS 1.2.
#[must_use]
pub fn protocol_versions(min: TlsVersion) -> Vec<&'static SupportedProtocolVersion> {
    if min <= TlsVersion::Tls12 {
        vec![&rustls::version::TLS13, &rustls::version::TLS12]
    } else {
        vec![&rustls::version::TLS13]
    }
}
