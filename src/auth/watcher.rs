//! Live authentication configuration.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::AuthConfig;
use super::descriptor::AuthDescriptor;
use crate::snapshot::LiveSnapshot;
use crate::watch::{ResourceSource, WatchEvent, WatchStream};
use crate::Result;

/// Read access to the current authentication configuration.
pub trait AuthConfigWatch: Send + Sync {
    /// The latest published snapshot. Never blocks on I/O.
    fn auth_config(&self) -> Arc<AuthConfig>;
}

/// Keeps an [`AuthConfig`] in step with the authentication descriptor.
pub struct AuthConfigWatcher {
    kind: String,
    snapshot: Arc<LiveSnapshot<AuthConfig>>,
    task: JoinHandle<()>,
}

impl AuthConfigWatcher {
    /// Read the descriptor once, then follow its changes in the background.
    ///
    /// The first read is synchronous: when this returns `Ok`, the snapshot is
    /// populated. The background task ends when `shutdown_rx` fires; the last
    /// snapshot keeps being served afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be watched or read, or if the first
    /// descriptor cannot be parsed. A missing descriptor is served as an empty
    /// one until it appears.
    pub async fn start(
        source: Arc<dyn ResourceSource<AuthDescriptor>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let kind = source.kind().to_owned();
        let events = source.watch()?;
        let descriptor = match source.fetch().await? {
            Some(descriptor) => descriptor,
            None => {
                warn!(
                    kind = %kind,
                    "Authentication descriptor not found, starting with an empty config"
                );
                AuthDescriptor::default()
            }
        };
        let initial = AuthConfig::from_descriptor(&descriptor)?;

        info!(
            kind = %kind,
            trust_anchors = initial.trust_anchor_count(),
            allowed_names = initial.allowed_common_names.len(),
            "Authentication config loaded"
        );

        let snapshot = Arc::new(LiveSnapshot::new(initial));
        let task = tokio::spawn(run(
            kind.clone(),
            Arc::clone(&snapshot),
            events,
            shutdown_rx,
        ));

        Ok(Self {
            kind,
            snapshot,
            task,
        })
    }

    /// Apply one change notification directly.
    ///
    /// Returns `true` if a new snapshot was published.
    pub fn handle_event(&self, event: WatchEvent<AuthDescriptor>) -> bool {
        apply_event(&self.kind, &self.snapshot, event)
    }

    /// Whether the background task is still following changes.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        !self.task.is_finished()
    }
}

impl AuthConfigWatch for AuthConfigWatcher {
    fn auth_config(&self) -> Arc<AuthConfig> {
        self.snapshot.get()
    }
}

/// A snapshot without a watcher, for fixed configurations.
impl AuthConfigWatch for LiveSnapshot<AuthConfig> {
    fn auth_config(&self) -> Arc<AuthConfig> {
        self.get()
    }
}

impl Drop for AuthConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    kind: String,
    snapshot: Arc<LiveSnapshot<AuthConfig>>,
    mut events: WatchStream<AuthDescriptor>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    apply_event(&kind, &snapshot, event);
                }
                None => {
                    warn!(kind = %kind, "Watch stream ended, serving last authentication config");
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                info!(kind = %kind, "Authentication config watcher shutting down");
                break;
            }
        }
    }
}

fn apply_event(
    kind: &str,
    snapshot: &LiveSnapshot<AuthConfig>,
    event: WatchEvent<AuthDescriptor>,
) -> bool {
    match event {
        WatchEvent::Applied(descriptor) => match AuthConfig::from_descriptor(&descriptor) {
            Ok(config) => {
                debug!(
                    kind,
                    trust_anchors = config.trust_anchor_count(),
                    "Publishing updated authentication config"
                );
                snapshot.set(config);
                true
            }
            Err(e) => {
                error!(
                    kind,
                    error = %e,
                    "Rejected authentication descriptor update, keeping previous config"
                );
                false
            }
        },
        WatchEvent::Deleted => {
            warn!(kind, "Authentication descriptor deleted, keeping previous config");
            false
        }
    }
}
