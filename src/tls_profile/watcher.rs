//! Live TLS policy.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::policy::TlsPolicy;
use super::profile::CdiConfig;
use crate::Result;
use crate::snapshot::LiveSnapshot;
use crate::watch::{ResourceSource, WatchEvent, WatchStream};

/// Read access to the current TLS policy.
pub trait TlsPolicyWatch: Send + Sync {
    /// The latest published policy. Never blocks on I/O.
    fn cdi_tls_config(&self) -> Arc<TlsPolicy>;
}

/// Keeps a [`TlsPolicy`] in step with the TLS profile selector.
pub struct TlsProfileWatcher {
    kind: String,
    snapshot: Arc<LiveSnapshot<TlsPolicy>>,
    task: JoinHandle<()>,
}

impl TlsProfileWatcher {
    /// Read the selector once, then follow its changes in the background.
    ///
    /// A missing resource is not an error: the policy starts as the default
    /// profile.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be watched or read.
    pub async fn start(
        source: Arc<dyn ResourceSource<CdiConfig>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let kind = source.kind().to_owned();
        let events = source.watch()?;
        let resource = source.fetch().await?;
        let initial = TlsPolicy::from_resource(resource.as_ref());

        info!(
            kind = %kind,
            profile = %initial.profile,
            min_version = %initial.min_version,
            cipher_suites = initial.cipher_suites.len(),
            "TLS policy loaded"
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
    /// Returns `true` if the published policy changed.
    pub fn handle_event(&self, event: WatchEvent<CdiConfig>) -> bool {
        apply_event(&self.kind, &self.snapshot, event)
    }

    /// Whether the background task is still following changes.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        !self.task.is_finished()
    }
}

impl TlsPolicyWatch for TlsProfileWatcher {
    fn cdi_tls_config(&self) -> Arc<TlsPolicy> {
        self.snapshot.get()
    }
}

impl TlsPolicyWatch for LiveSnapshot<TlsPolicy> {
    fn cdi_tls_config(&self) -> Arc<TlsPolicy> {
        self.get()
    }
}

impl Drop for TlsProfileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    kind: String,
    snapshot: Arc<LiveSnapshot<TlsPolicy>>,
    mut events: WatchStream<CdiConfig>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    apply_event(&kind, &snapshot, event);
                }
                None => {
                    warn!(kind = %kind, "Watch stream ended, serving last TLS policy");
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                info!(kind = %kind, "TLS profile watcher shutting down");
                break;
            }
        }
    }
}

fn apply_event(
    kind: &str,
    snapshot: &LiveSnapshot<TlsPolicy>,
    event: WatchEvent<CdiConfig>,
) -> bool {
    let policy = match event {
        WatchEvent::Applied(resource) => TlsPolicy::from_resource(Some(&resource)),
        WatchEvent::Deleted => {
            info!(kind, "TLS profile resource deleted, reverting to default profile");
            TlsPolicy::default()
        }
    };

    let policy = Arc::new(policy);
    let previous = snapshot.replace(Arc::clone(&policy));
    let changed = *previous != *policy;
    if changed {
        info!(
            kind,
            from = %previous.profile,
            to = %policy.profile,
            min_version = %policy.min_version,
            cipher_suites = policy.cipher_suites.len(),
            "TLS policy updated"
        );
    }
    changed
}
