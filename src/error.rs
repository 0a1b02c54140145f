//! Error types for the API server TLS subsystem

use std::io;

use thiserror::Error;

/// Result type alias for the API server TLS subsystem
pub type Result<T> = std::result::Result<T, Error>;

/// API server TLS errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A watched resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// PEM certificate material could not be parsed
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// The serving certificate could not be obtained
    #[error("Certificate unavailable: {0}")]
    Certificate(String),

    /// rustls rejected the assembled configuration
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Client certificate verifier could not be built
    #[error("Client verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    /// Watch/notification plumbing failed
    #[error("Watch error: {0}")]
    Watch(String),

    /// TLS handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error only affects the connection it happened on.
    #[must_use]
    pub fn is_connection_local(&self) -> bool {
        matches!(
            self,
            Self::Certificate(_)
                | Self::Tls(_)
                | Self::Verifier(_)
                | Self::Handshake(_)
        )
    }
}
