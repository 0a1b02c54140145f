//! Change-notification sources for watched resources.
//!
//! A [`ResourceSource`] knows how to read the current state of one named
//! resource and how to deliver a stream of [`WatchEvent`]s describing later
//! states. Delivery is eventually consistent and at-least-once: consumers must
//! treat every event as "this is the current object", not as a delta.
//!
//! ```text
//! ResourceSource::watch()  ──▶ WatchEvent::Applied(obj) / WatchEvent::Deleted
//!        │                                   │
//!        └── ResourceSource::fetch() ──▶ initial state (before the first event)
//! ```
//!
//! Callers subscribe with [`ResourceSource::watch`] *before* calling
//! [`ResourceSource::fetch`], so a change landing between the two is never
//! lost.

pub mod file;
pub mod memory;

use std::ffi::OsString;

use async_trait::async_trait;
use futures::stream::BoxStream;
use notify::{Event, EventKind};

use crate::Result;

pub use file::FileSource;
pub use memory::MemorySource;

/// One notification about a watched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// The resource was created or updated; carries its full current state.
    Applied(T),
    /// The resource no longer exists.
    Deleted,
}

/// Stream of change notifications for a single resource.
pub type WatchStream<T> = BoxStream<'static, WatchEvent<T>>;

/// A resource whose state can be read and watched.
#[async_trait]
pub trait ResourceSource<T>: Send + Sync {
    /// Human-readable name of the watched resource, for logs and errors.
    fn kind(&self) -> &str;

    /// Read the current state. `Ok(None)` means the resource does not exist.
    async fn fetch(&self) -> Result<Option<T>>;

    /// Subscribe to subsequent changes.
    fn watch(&self) -> Result<WatchStream<T>>;
}

/// Link a projected ConfigMap or Secret volume swaps atomically on update.
///
/// The projected files are symlinks through it, so an update renames this
/// link and never touches the files themselves.
pub const PROJECTION_DATA_LINK: &str = "..data";

/// Whether a filesystem event in a watched directory can change one of the
/// files named `names`.
pub(crate) fn affects_files(event: &Event, names: &[OsString]) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| {
        p.file_name()
            .is_some_and(|n| n == PROJECTION_DATA_LINK || names.iter().any(|m| m == n))
    })
}

/// Lay out `dir` like a projected volume at `version`: every file is a
/// symlink through [`PROJECTION_DATA_LINK`], which is swapped by rename.
#[cfg(all(test, unix))]
pub(crate) fn project_volume(dir: &std::path::Path, version: &str, files: &[(&str, &str)]) {
    use std::os::unix::fs::symlink;

    let versioned = dir.join(version);
    std::fs::create_dir(&versioned).unwrap();
    for (name, content) in files {
        std::fs::write(versioned.join(name), content).unwrap();
    }
    let tmp = dir.join("..data_tmp");
    symlink(version, &tmp).unwrap();
    std::fs::rename(&tmp, dir.join(PROJECTION_DATA_LINK)).unwrap();
    for (name, _) in files {
        let link = dir.join(name);
        if std::fs::symlink_metadata(&link).is_err() {
            symlink(std::path::Path::new(PROJECTION_DATA_LINK).join(name), &link).unwrap();
        }
    }
}
