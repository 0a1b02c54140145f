//! Server-side mTLS handshake driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::LazyConfigAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

use super::assembler::{HandshakeInfo, TlsConfigAssembler};
use super::identity::PeerIdentity;
use crate::{Error, Result};

/// Default limit for a complete handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts TLS connections, assembling the server config per handshake.
#[derive(Clone)]
pub struct MtlsAcceptor {
    assembler: Arc<TlsConfigAssembler>,
    handshake_timeout: Duration,
}

impl MtlsAcceptor {
    /// Create an acceptor with the default handshake timeout.
    #[must_use]
    pub fn new(assembler: Arc<TlsConfigAssembler>) -> Self {
        Self {
            assembler,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Run the handshake on `io` and return the stream with the client's
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::Handshake` on timeout, I/O or protocol failure, or any
    /// assembler error. The connection should be dropped.
    pub async fn accept<IO>(&self, io: IO) -> Result<(TlsStream<IO>, PeerIdentity)>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::time::timeout(self.handshake_timeout, self.handshake(io))
            .await
            .map_err(|_| Error::Handshake("timed out".to_owned()))?
    }

    async fn handshake<IO>(&self, io: IO) -> Result<(TlsStream<IO>, PeerIdentity)>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), io)
            .await
            .map_err(|e| Error::Handshake(format!("reading ClientHello: {e}")))?;

        let hello = HandshakeInfo::from_client_hello(&start.client_hello());
        let config = self.assembler.config_for_handshake(&hello).inspect_err(|e| {
            warn!(
                server_name = hello.server_name.as_deref().unwrap_or(""),
                error = %e,
                "Refusing connection"
            );
        })?;

        let stream = start
            .into_stream(config)
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let leaf = stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(<[_]>::first)
            .ok_or_else(|| Error::Handshake("no client certificate".to_owned()))?;
        let peer = PeerIdentity::from_der(leaf)?;

        debug!(
            peer = peer.display_name(),
            server_name = hello.server_name.as_deref().unwrap_or(""),
            "mTLS handshake complete"
        );
        Ok((stream, peer))
    }
}
