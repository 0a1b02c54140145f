//! Serving certificate sources.
//!
//! All certificate and key material is PEM. [`FileCertificateSource`] reloads
//! from disk when either file changes; a failed reload keeps serving the
//! previous certificate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::assembler::{CertificateSource, HandshakeInfo};
use crate::snapshot::LiveSnapshot;
use crate::watch::affects_files;
use crate::{Error, Result};

/// Quiet period after the last file event before reloading.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Parse a PEM certificate chain and private key into a signing key.
///
/// # Errors
///
/// Returns `Error::CertificateParse` if either PEM block is missing or
/// malformed, and `Error::Tls` if the key is unsupported or does not match
/// the leaf certificate.
pub fn load_certified_key(
    cert_pem: &[u8],
    key_pem: &[u8],
    provider: &CryptoProvider,
) -> Result<CertifiedKey> {
    let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::CertificateParse(format!("certificate chain: {e}")))?;
    if chain.is_empty() {
        return Err(Error::CertificateParse(
            "certificate chain: no PEM certificates found".to_owned(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| Error::CertificateParse(format!("private key: {e}")))?
        .ok_or_else(|| Error::CertificateParse("private key: no PEM key found".to_owned()))?;

    let signing_key = provider.key_provider.load_private_key(key)?;
    let certified = CertifiedKey::new(chain, signing_key);
    match certified.keys_match() {
        Ok(()) | Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {
            Ok(certified)
        }
        Err(e) => Err(e.into()),
    }
}

/// One fixed certificate.
#[derive(Debug, Clone)]
pub struct StaticCertificate {
    key: Arc<CertifiedKey>,
}

impl StaticCertificate {
    /// Wrap an already loaded key.
    #[must_use]
    pub fn new(key: Arc<CertifiedKey>) -> Self {
        Self { key }
    }

    /// Load from PEM bytes.
    ///
    /// # Errors
    ///
    /// See [`load_certified_key`].
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], provider: &CryptoProvider) -> Result<Self> {
        Ok(Self::new(Arc::new(load_certified_key(
            cert_pem, key_pem, provider,
        )?)))
    }
}

impl CertificateSource for StaticCertificate {
    fn certificate(&self, _hello: &HandshakeInfo) -> Result<Arc<CertifiedKey>> {
        Ok(Arc::clone(&self.key))
    }
}

/// Certificate and key read from PEM files, reloadable.
pub struct FileCertificateSource {
    cert_path: PathBuf,
    key_path: PathBuf,
    provider: Arc<CryptoProvider>,
    current: LiveSnapshot<CertifiedKey>,
}

impl std::fmt::Debug for FileCertificateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCertificateSource")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

impl FileCertificateSource {
    /// Load both files.
    ///
    /// # Errors
    ///
    /// Fails if either file is unreadable or the pair is unusable.
    pub fn load(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self> {
        let cert_path = cert_path.into();
        let key_path = key_path.into();
        let key = read_pair(&cert_path, &key_path, &provider)?;
        info!(cert = %cert_path.display(), "Serving certificate loaded");
        Ok(Self {
            cert_path,
            key_path,
            provider,
            current: LiveSnapshot::new(key),
        })
    }

    /// Re-read both files. On failure the current certificate stays.
    ///
    /// # Errors
    ///
    /// Returns the load error; the served certificate is unchanged.
    pub fn reload(&self) -> Result<()> {
        let key = read_pair(&self.cert_path, &self.key_path, &self.provider)?;
        self.current.set(key);
        info!(cert = %self.cert_path.display(), "Serving certificate reloaded");
        Ok(())
    }

    /// The currently served certificate.
    #[must_use]
    pub fn current(&self) -> Arc<CertifiedKey> {
        self.current.get()
    }

    /// Reload whenever the certificate or key file changes, including a
    /// Secret volume swapping its projection link.
    ///
    /// The returned watcher must be kept alive; reloading stops when it is
    /// dropped or `shutdown_rx` fires.
    ///
    /// # Errors
    ///
    /// Fails if the file watcher cannot be created.
    pub fn watch(
        self: &Arc<Self>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<CertificateWatcher> {
        let (event_tx, event_rx) = mpsc::channel(1);
        let names: Vec<_> = [&self.cert_path, &self.key_path]
            .iter()
            .filter_map(|p| p.file_name().map(ToOwned::to_owned))
            .collect();

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if affects_files(&event, &names) {
                        debug!(paths = ?event.paths, kind = ?event.kind, "Certificate file change");
                        let _ = event_tx.try_send(());
                    }
                }
                Err(e) => error!(error = %e, "Certificate watcher error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| Error::Watch(format!("Failed to create certificate watcher: {e}")))?;

        let mut dirs = vec![parent_dir(&self.cert_path), parent_dir(&self.key_path)];
        dirs.dedup();
        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::Watch(format!("Cannot watch '{}': {e}", dir.display())))?;
            info!(directory = %dir.display(), "Watching serving certificate");
        }

        spawn_reload_task(Arc::clone(self), event_rx, shutdown_rx);
        Ok(CertificateWatcher { _watcher: watcher })
    }
}

impl CertificateSource for FileCertificateSource {
    fn certificate(&self, _hello: &HandshakeInfo) -> Result<Arc<CertifiedKey>> {
        Ok(self.current())
    }
}

/// Keeps a [`FileCertificateSource`] reloading while alive.
pub struct CertificateWatcher {
    _watcher: RecommendedWatcher,
}

fn spawn_reload_task(
    source: Arc<FileCertificateSource>,
    mut event_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut last_event: Option<Instant> = None;
        let mut interval = tokio::time::interval(Duration::from_millis(100));

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(()) => last_event = Some(Instant::now()),
                    None => break,
                },
                _ = interval.tick() => {
                    if last_event.is_some_and(|at| at.elapsed() >= RELOAD_DEBOUNCE) {
                        last_event = None;
                        if let Err(e) = source.reload() {
                            warn!(
                                error = %e,
                                "Certificate reload failed, keeping previous certificate"
                            );
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Certificate watcher shutting down");
                    break;
                }
            }
        }
    });
}

fn read_pair(cert_path: &Path, key_path: &Path, provider: &CryptoProvider) -> Result<CertifiedKey> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        Error::Certificate(format!("cannot read '{}': {e}", cert_path.display()))
    })?;
    let key_pem = std::fs::read(key_path).map_err(|e| {
        Error::Certificate(format!("cannot read '{}': {e}", key_path.display()))
    })?;
    load_certified_key(&cert_pem, &key_pem, provider)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
