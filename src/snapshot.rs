//! Atomically-swappable immutable snapshots.
//!
//! Every watcher publishes its state through a [`LiveSnapshot`]. Readers take
//! a read-lock and clone the inner `Arc`; writers replace the whole `Arc`
//! under a write-lock. Nobody mutates a published value in place, so a reader
//! holds either the complete old value or the complete new one.

use std::sync::Arc;

use parking_lot::RwLock;

/// A live value that is replaced wholesale, never field-by-field.
#[derive(Debug)]
pub struct LiveSnapshot<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> LiveSnapshot<T> {
    /// Seed the cell with its first value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Arc::new(value)),
        }
    }

    /// Clone the current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.inner.read())
    }

    /// Publish a new snapshot, returning the one it replaced.
    pub fn set(&self, value: T) -> Arc<T> {
        self.replace(Arc::new(value))
    }

    /// Publish an already-shared snapshot, returning the one it replaced.
    pub fn replace(&self, value: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.inner.write(), value)
    }
}
