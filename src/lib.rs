//! Live trust and cipher configuration for a mutually-authenticated API server.
//!
//! # Features
//!
//! - **Client-CA hot swap**: the authentication descriptor is watched and the
//!   client-CA pool, front-proxy headers and allowed names follow it
//! - **TLS security profiles**: `Old`, `Intermediate`, `Modern` and `Custom`
//!   select the minimum TLS version and cipher suites, falling back to
//!   `Intermediate`
//! - **Per-handshake assembly**: every connection gets a server config built
//!   from the latest snapshots; nothing needs a restart
//! - **Resource locks**: non-blocking named try-locks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod locks;
pub mod mtls;
pub mod server;
pub mod snapshot;
pub mod tls_profile;
pub mod watch;

pub use auth::{AuthConfig, AuthConfigWatch, AuthConfigWatcher};
pub use error::{Error, Result};
pub use locks::{ResourceLockGuard, ResourceLocks};
pub use mtls::{CertificateSource, HandshakeInfo, MtlsAcceptor, TlsConfigAssembler};
pub use snapshot::LiveSnapshot;
pub use tls_profile::{TlsPolicy, TlsPolicyWatch, TlsProfileWatcher};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
