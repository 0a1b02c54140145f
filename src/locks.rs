//! Per-resource non-blocking locks.
//!
//! [`ResourceLocks`] is a set of resource identifiers with an ongoing
//! operation. Acquiring is a test-and-set: a caller that loses the race gets
//! `false` back immediately and must treat the operation as already in
//! progress elsewhere (skip it, or requeue at a higher layer). Nobody waits.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::trace;

/// Set of resource identifiers currently locked by some caller.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    locks: Mutex<HashSet<String>>,
}

impl ResourceLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for `resource`.
    ///
    /// Returns `true` if the caller now holds it, `false` if another caller
    /// already does.
    pub fn try_acquire(&self, resource: &str) -> bool {
        let acquired = {
            let mut locks = self.locks.lock();
            if locks.contains(resource) {
                false
            } else {
                locks.insert(resource.to_owned())
            }
        };
        trace!(resource, acquired, "try_acquire");
        acquired
    }

    /// Release the lock for `resource`. Releasing an unheld lock is a no-op.
    pub fn release(&self, resource: &str) {
        self.locks.lock().remove(resource);
        trace!(resource, "released");
    }

    /// Whether some caller currently holds `resource`.
    #[must_use]
    pub fn is_held(&self, resource: &str) -> bool {
        self.locks.lock().contains(resource)
    }

    /// Number of resources currently locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// `true` when no resource is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Like [`try_acquire`](Self::try_acquire), but the returned guard
    /// releases the lock when dropped.
    pub fn try_lock<'a>(&'a self, resource: &str) -> Option<ResourceLockGuard<'a>> {
        self.try_acquire(resource).then(|| ResourceLockGuard {
            locks: self,
            resource: resource.to_owned(),
        })
    }
}

/// Holds one resource lock until dropped.
#[derive(Debug)]
pub struct ResourceLockGuard<'a> {
    locks: &'a ResourceLocks,
    resource: String,
}

impl ResourceLockGuard<'_> {
    /// The locked resource identifier.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for ResourceLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.resource);
    }
}
