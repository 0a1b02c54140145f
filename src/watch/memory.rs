//! In-process resource source.
//!
//! Holds the current object and fans changes out over a `broadcast` channel.
//! Used for embedding (another component pushes state in) and in tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use super::{ResourceSource, WatchEvent, WatchStream};
use crate::Result;

const CHANNEL_CAPACITY: usize = 64;

/// A resource whose state lives in memory.
pub struct MemorySource<T> {
    kind: String,
    current: Arc<RwLock<Option<T>>>,
    events: broadcast::Sender<WatchEvent<T>>,
}

impl<T> MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a source, optionally seeded with an existing object.
    #[must_use]
    pub fn new(kind: impl Into<String>, initial: Option<T>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            kind: kind.into(),
            current: Arc::new(RwLock::new(initial)),
            events,
        }
    }

    /// Create or update the object and notify watchers.
    pub fn apply(&self, object: T) {
        let mut current = self.current.write();
        *current = Some(object.clone());
        // No receivers is fine: the next fetch() sees the new state.
        let _ = self.events.send(WatchEvent::Applied(object));
    }

    /// Remove the object and notify watchers.
    pub fn delete(&self) {
        let mut current = self.current.write();
        *current = None;
        let _ = self.events.send(WatchEvent::Deleted);
    }

    /// Number of live watch streams.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl<T> ResourceSource<T> for MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn fetch(&self) -> Result<Option<T>> {
        Ok(self.current.read().clone())
    }

    fn watch(&self) -> Result<WatchStream<T>> {
        let current = Arc::clone(&self.current);
        let kind = self.kind.clone();
        let stream = BroadcastStream::new(self.events.subscribe()).map(move |item| match item {
            Ok(event) => event,
            // Lagged receivers resynchronize from the current state.
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(kind = %kind, skipped, "Watch stream lagged, resyncing from current state");
                current
                    .read()
                    .clone()
                    .map_or(WatchEvent::Deleted, WatchEvent::Applied)
            }
        });
        Ok(stream.boxed())
    }
}
