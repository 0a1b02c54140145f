//! Mutual TLS serving.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → ClientHello read lazily       (acceptor.rs)
//!   → ServerConfig built for it     (assembler.rs: AuthConfig + TlsPolicy + certificate)
//!   → handshake, client cert verified against the client-CA pool
//!   → PeerIdentity from the leaf    (identity.rs)
//! ```
//!
//! The serving certificate comes from a [`CertificateSource`]; see
//! [`cert_source`] for the static and file-backed ones.

pub mod acceptor;
pub mod assembler;
pub mod cert_source;
pub mod identity;

pub use acceptor::{DEFAULT_HANDSHAKE_TIMEOUT, MtlsAcceptor};
pub use assembler::{
    ALPN_PROTOCOLS, CertificateSource, HandshakeInfo, TlsConfigAssembler, protocol_versions,
};
pub use cert_source::{
    CertificateWatcher, FileCertificateSource, StaticCertificate, load_certified_key,
};
pub use identity::PeerIdentity;
