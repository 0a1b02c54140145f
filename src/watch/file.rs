//! YAML-file-backed resource source.
//!
//! The resource is a single YAML document on disk (for example a mounted
//! ConfigMap projection). The parent directory is watched with `notify`; any
//! create/modify/remove touching the file, or swapping the projection's
//! [`PROJECTION_DATA_LINK`](super::PROJECTION_DATA_LINK), re-reads it and
//! emits the full current state. Bursts of filesystem events coalesce into one
//! re-read.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ResourceSource, WatchEvent, WatchStream, affects_files};
use crate::{Error, Result};

/// A resource stored as a YAML file.
pub struct FileSource<T> {
    kind: String,
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FileSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Create a source for `path`. The file does not need to exist yet.
    #[must_use]
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl<T> ResourceSource<T> for FileSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn fetch(&self) -> Result<Option<T>> {
        read_resource(&self.path).await
    }

    fn watch(&self) -> Result<WatchStream<T>> {
        // Capacity 1: a pending signal already means "re-read the file".
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let names: Vec<_> = self.path.file_name().into_iter().map(ToOwned::to_owned).collect();

        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if affects_files(&event, &names) {
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => error!(error = %e, "File watcher error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| Error::Watch(format!("Failed to create file watcher: {e}")))?;

        let dir = self.watch_dir();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("Cannot watch '{}': {e}", dir.display())))?;
        info!(kind = %self.kind, path = %self.path.display(), "Watching resource file");

        let path = self.path.clone();
        let kind = self.kind.clone();
        let stream = async_stream::stream! {
            // The watcher stops when the stream is dropped.
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                match read_resource::<T>(&path).await {
                    Ok(Some(object)) => yield WatchEvent::Applied(object),
                    Ok(None) => yield WatchEvent::Deleted,
                    Err(e) => warn!(kind = %kind, error = %e, "Ignoring unreadable resource file"),
                }
            }
            debug!(kind = %kind, "File watch stream closed");
        };
        Ok(Box::pin(stream))
    }
}

/// Read and parse the file. A missing or blank file is an absent resource.
async fn read_resource<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_yaml::from_str(&content)?))
}
