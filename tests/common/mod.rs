//! Shared fixtures: a throwaway PKI and an in-memory mTLS harness.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;

use cdi_apiserver_tls::auth::AuthDescriptor;
use cdi_apiserver_tls::auth::descriptor::{
    CLIENT_CA_KEY, REQUESTHEADER_ALLOWED_NAMES_KEY, REQUESTHEADER_CLIENT_CA_KEY,
    REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY, REQUESTHEADER_GROUP_HEADERS_KEY,
    REQUESTHEADER_USERNAME_HEADERS_KEY,
};
use cdi_apiserver_tls::mtls::PeerIdentity;
use cdi_apiserver_tls::{MtlsAcceptor, Result};

/// Host name in the serving certificate.
pub const SERVER_NAME: &str = "apiserver.cdi.svc";

pub fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// A certificate authority able to issue leaves.
pub struct TestCa {
    pub pem: String,
    pub der: CertificateDer<'static>,
    issuer: Issuer<'static, KeyPair>,
}

/// An issued certificate with its key.
pub struct TestLeaf {
    pub cert_pem: String,
    pub key_pem: String,
    pub chain: Vec<CertificateDer<'static>>,
    key_der: Vec<u8>,
}

impl TestLeaf {
    pub fn key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self {
            pem: cert.pem(),
            der: cert.der().clone(),
            issuer: Issuer::new(params, key),
        }
    }

    fn issue(&self, cn: &str, sans: Vec<SanType>, usage: ExtendedKeyUsagePurpose) -> TestLeaf {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.subject_alt_names = sans;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![usage];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        TestLeaf {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            chain: vec![cert.der().clone()],
            key_der: key.serialize_der(),
        }
    }

    /// Serving certificate for [`SERVER_NAME`].
    pub fn server(&self) -> TestLeaf {
        self.issue(
            SERVER_NAME,
            vec![SanType::DnsName(SERVER_NAME.try_into().unwrap())],
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }

    /// Client certificate with the given common name.
    pub fn client(&self, cn: &str) -> TestLeaf {
        self.issue(cn, Vec::new(), ExtendedKeyUsagePurpose::ClientAuth)
    }
}

/// Descriptor trusting `ca_pem` for client certificates and front-proxy
/// identity, allowing `allowed_names` (JSON-like list).
pub fn descriptor(ca_pem: &str, allowed_names: &str) -> AuthDescriptor {
    AuthDescriptor::from_pairs([
        (CLIENT_CA_KEY, ca_pem),
        (REQUESTHEADER_CLIENT_CA_KEY, ca_pem),
        (REQUESTHEADER_ALLOWED_NAMES_KEY, allowed_names),
        (REQUESTHEADER_USERNAME_HEADERS_KEY, r#"["X-Remote-User"]"#),
        (REQUESTHEADER_GROUP_HEADERS_KEY, r#"["X-Remote-Group"]"#),
        (REQUESTHEADER_EXTRA_HEADERS_PREFIX_KEY, r#"["X-Remote-Extra-"]"#),
    ])
}

/// Client settings for one handshake.
pub struct ClientOptions<'a> {
    pub roots: &'a TestCa,
    pub identity: Option<&'a TestLeaf>,
    pub versions: &'a [&'static SupportedProtocolVersion],
    pub cipher_suites: Option<Vec<SupportedCipherSuite>>,
    pub alpn: Vec<Vec<u8>>,
}

impl<'a> ClientOptions<'a> {
    pub fn new(roots: &'a TestCa, identity: Option<&'a TestLeaf>) -> Self {
        Self {
            roots,
            identity,
            versions: rustls::DEFAULT_VERSIONS,
            cipher_suites: None,
            alpn: Vec::new(),
        }
    }

    pub fn config(&self) -> ClientConfig {
        let base = rustls::crypto::aws_lc_rs::default_provider();
        let provider = match &self.cipher_suites {
            Some(suites) => CryptoProvider {
                cipher_suites: suites.clone(),
                ..base
            },
            None => base,
        };
        let mut roots = RootCertStore::empty();
        roots.add(self.roots.der.clone()).unwrap();
        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(self.versions)
            .unwrap()
            .with_root_certificates(roots);
        let mut config = match self.identity {
            Some(leaf) => builder
                .with_client_auth_cert(leaf.chain.clone(), leaf.key())
                .unwrap(),
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = self.alpn.clone();
        config
    }
}

/// What the client saw after a successful handshake.
#[derive(Debug)]
pub struct ClientView {
    pub version: rustls::ProtocolVersion,
    pub cipher_suite: rustls::CipherSuite,
    pub alpn: Option<Vec<u8>>,
}

/// Run one handshake over an in-memory pipe, then echo one byte through it.
pub async fn handshake(
    acceptor: &MtlsAcceptor,
    client: ClientConfig,
) -> (Result<PeerIdentity>, std::io::Result<ClientView>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let server = async {
        let (mut stream, peer) = acceptor.accept(server_io).await?;
        let mut byte = [0u8; 1];
        if stream.read_exact(&mut byte).await.is_ok() {
            let _ = stream.write_all(&byte).await;
            let _ = stream.flush().await;
        }
        Ok::<_, cdi_apiserver_tls::Error>(peer)
    };

    let client = async {
        let name = ServerName::try_from(SERVER_NAME).unwrap();
        let mut stream = TlsConnector::from(Arc::new(client))
            .connect(name, client_io)
            .await?;
        // TLS 1.3 client auth failures surface on the first read.
        stream.write_all(b"x").await?;
        stream.flush().await?;
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await?;

        let conn = stream.get_ref().1;
        Ok::<_, std::io::Error>(ClientView {
            version: conn.protocol_version().unwrap(),
            cipher_suite: conn.negotiated_cipher_suite().unwrap().suite(),
            alpn: conn.alpn_protocol().map(<[u8]>::to_vec),
        })
    };

    tokio::join!(server, client)
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Lay out `dir` the way kubelet projects a ConfigMap: `name -> ..data/name`
/// and `..data -> version`, with `..data` replaced by rename.
#[cfg(unix)]
pub fn project_configmap(dir: &std::path::Path, version: &str, name: &str, content: &str) {
    use std::os::unix::fs::symlink;

    let versioned = dir.join(version);
    std::fs::create_dir(&versioned).unwrap();
    std::fs::write(versioned.join(name), content).unwrap();
    let tmp = dir.join("..data_tmp");
    symlink(version, &tmp).unwrap();
    std::fs::rename(&tmp, dir.join("..data")).unwrap();
    let link = dir.join(name);
    if std::fs::symlink_metadata(&link).is_err() {
        symlink(std::path::Path::new("..data").join(name), &link).unwrap();
    }
}
