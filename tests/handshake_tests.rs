//! End-to-end mTLS handshakes over in-memory pipes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rustls::sign::CertifiedKey;
use rustls::{CipherSuite, ProtocolVersion};

use cdi_apiserver_tls::mtls::{
    CertificateSource, HandshakeInfo, MtlsAcceptor, StaticCertificate, TlsConfigAssembler,
};
use cdi_apiserver_tls::tls_profile::{TlsProfileType, TlsSecurityProfile};
use cdi_apiserver_tls::{AuthConfig, Error, LiveSnapshot, Result, TlsPolicy};

use common::{ClientOptions, TestCa, descriptor, handshake, provider};

struct Server {
    auth: Arc<LiveSnapshot<AuthConfig>>,
    tls: Arc<LiveSnapshot<TlsPolicy>>,
    acceptor: MtlsAcceptor,
}

fn server_with(ca: &TestCa, policy: TlsPolicy, certs: Arc<dyn CertificateSource>) -> Server {
    let auth = Arc::new(LiveSnapshot::new(
        AuthConfig::from_descriptor(&descriptor(&ca.pem, "")).unwrap(),
    ));
    let tls = Arc::new(LiveSnapshot::new(policy));
    let assembler = TlsConfigAssembler::new(auth.clone(), tls.clone(), certs);
    Server {
        auth,
        tls,
        acceptor: MtlsAcceptor::new(Arc::new(assembler)),
    }
}

fn server(ca: &TestCa, policy: TlsPolicy) -> Server {
    let leaf = ca.server();
    let certs = StaticCertificate::from_pem(
        leaf.cert_pem.as_bytes(),
        leaf.key_pem.as_bytes(),
        &provider(),
    )
    .unwrap();
    server_with(ca, policy, Arc::new(certs))
}

fn profile(kind: TlsProfileType) -> TlsPolicy {
    TlsPolicy::from_profile(Some(&TlsSecurityProfile::of_type(kind)))
}

#[tokio::test]
async fn mutual_handshake_extracts_client_identity() {
    // GIVEN: a server trusting the cluster CA, and a client it issued
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, TlsPolicy::default());
    let client_leaf = ca.client("front-proxy-client");
    let mut options = ClientOptions::new(&ca, Some(&client_leaf));
    options.alpn = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    // WHEN: they handshake
    let (peer, view) = handshake(&server.acceptor, options.config()).await;

    // THEN: both sides succeed and the server sees the client's CN
    let peer = peer.unwrap();
    let view = view.unwrap();
    assert_eq!(peer.common_name.as_deref(), Some("front-proxy-client"));
    assert_eq!(view.version, ProtocolVersion::TLSv1_3);
    assert_eq!(view.alpn.as_deref(), Some(&b"h2"[..]));
}

#[tokio::test]
async fn client_without_certificate_is_rejected() {
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, TlsPolicy::default());

    let (peer, view) = handshake(&server.acceptor, ClientOptions::new(&ca, None).config()).await;

    assert!(matches!(peer, Err(Error::Handshake(_))));
    assert!(view.is_err());
}

#[tokio::test]
async fn client_from_untrusted_ca_is_rejected() {
    let ca = TestCa::new("cluster-ca");
    let rogue = TestCa::new("rogue-ca");
    let server = server(&ca, TlsPolicy::default());
    let intruder = rogue.client("front-proxy-client");

    let (peer, view) = handshake(
        &server.acceptor,
        ClientOptions::new(&ca, Some(&intruder)).config(),
    )
    .await;

    assert!(peer.is_err());
    assert!(view.is_err());
}

#[tokio::test]
async fn modern_profile_rejects_tls12_client() {
    // GIVEN: a Modern (TLS 1.3 only) server and a TLS 1.2-only client
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, profile(TlsProfileType::Modern));
    let client_leaf = ca.client("kubelet");
    let mut options = ClientOptions::new(&ca, Some(&client_leaf));
    let tls12_only = [&rustls::version::TLS12];
    options.versions = &tls12_only;

    // WHEN / THEN: the handshake fails on both sides
    let (peer, view) = handshake(&server.acceptor, options.config()).await;
    assert!(peer.is_err());
    assert!(view.is_err());
}

#[tokio::test]
async fn old_profile_accepts_tls12_client() {
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, profile(TlsProfileType::Old));
    let client_leaf = ca.client("legacy-client");
    let mut options = ClientOptions::new(&ca, Some(&client_leaf));
    let tls12_only = [&rustls::version::TLS12];
    options.versions = &tls12_only;

    let (peer, view) = handshake(&server.acceptor, options.config()).await;

    assert!(peer.is_ok());
    assert_eq!(view.unwrap().version, ProtocolVersion::TLSv1_2);
}

#[tokio::test]
async fn custom_profile_negotiates_its_only_suite() {
    // GIVEN: a custom profile allowing exactly one TLS 1.2 suite
    let ca = TestCa::new("cluster-ca");
    let policy = TlsPolicy::from_profile(Some(&TlsSecurityProfile::custom(
        "VersionTLS12",
        &["ECDHE-ECDSA-AES128-GCM-SHA256"],
    )));
    let server = server(&ca, policy);
    let client_leaf = ca.client("kubelet");

    // WHEN: a client offering everything connects
    let (peer, view) = handshake(
        &server.acceptor,
        ClientOptions::new(&ca, Some(&client_leaf)).config(),
    )
    .await;

    // THEN: that suite is negotiated
    assert!(peer.is_ok());
    let view = view.unwrap();
    assert_eq!(view.version, ProtocolVersion::TLSv1_2);
    assert_eq!(
        view.cipher_suite,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    );
}

#[tokio::test]
async fn profile_change_applies_to_next_handshake() {
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, profile(TlsProfileType::Intermediate));
    let client_leaf = ca.client("kubelet");
    let mut options = ClientOptions::new(&ca, Some(&client_leaf));
    let tls12_only = [&rustls::version::TLS12];
    options.versions = &tls12_only;

    let (first, _) = handshake(&server.acceptor, options.config()).await;
    assert!(first.is_ok());

    server.tls.set(profile(TlsProfileType::Modern));
    let (second, _) = handshake(&server.acceptor, options.config()).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn trust_rotation_applies_to_next_handshake() {
    // GIVEN: a server trusting the old CA
    let old_ca = TestCa::new("old-ca");
    let new_ca = TestCa::new("new-ca");
    let server = server(&old_ca, TlsPolicy::default());
    let old_client = old_ca.client("kubelet");
    let new_client = new_ca.client("kubelet");

    // WHEN: the descriptor switches to the new CA
    server.auth.set(AuthConfig::from_descriptor(&descriptor(&new_ca.pem, "")).unwrap());

    // THEN: only clients of the new CA get in
    let (peer, _) = handshake(
        &server.acceptor,
        ClientOptions::new(&old_ca, Some(&old_client)).config(),
    )
    .await;
    assert!(peer.is_err());

    let (peer, view) = handshake(
        &server.acceptor,
        ClientOptions::new(&old_ca, Some(&new_client)).config(),
    )
    .await;
    assert!(peer.is_ok());
    assert!(view.is_ok());
}

struct Unavailable;

impl CertificateSource for Unavailable {
    fn certificate(&self, _hello: &HandshakeInfo) -> Result<Arc<CertifiedKey>> {
        Err(Error::Certificate("rotation in progress".to_owned()))
    }
}

#[tokio::test]
async fn certificate_failure_refuses_connection() {
    let ca = TestCa::new("cluster-ca");
    let server = server_with(&ca, TlsPolicy::default(), Arc::new(Unavailable));
    let client_leaf = ca.client("kubelet");

    let (peer, view) = handshake(
        &server.acceptor,
        ClientOptions::new(&ca, Some(&client_leaf)).config(),
    )
    .await;

    assert!(matches!(peer, Err(Error::Certificate(_))));
    assert!(view.is_err());
}

#[tokio::test]
async fn silent_client_times_out() {
    let ca = TestCa::new("cluster-ca");
    let server = server(&ca, TlsPolicy::default());
    let acceptor = server
        .acceptor
        .clone()
        .with_handshake_timeout(Duration::from_millis(100));

    let (_client_io, server_io) = tokio::io::duplex(1024);
    let err = acceptor.accept(server_io).await.err().unwrap();

    assert!(matches!(err, Error::Handshake(_)));
}
