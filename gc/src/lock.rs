//! The `gc_lock` readers/writer primitive (§4.9, §5): every write RPC and
//! every blob upload takes the shared side so they can proceed concurrently
//! with each other; a GC pass takes the exclusive side briefly while it
//! decides reachability, so no writer can add a reference to a blob GC has
//! already decided to delete.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct GcLock {
    inner: RwLock<()>,
}

impl GcLock {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
        }
    }

    /// Held by write RPCs (`Init`, `PushFull`, `SetBookmark`, `NewChange`,
    /// `RemoveChange`, ...) and by blob PUT for the whole
    /// write-then-hash-verify sequence.
    pub async fn writer_permit(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().await
    }

    /// Held by a GC pass for the duration of its reachability scan and the
    /// deletions it decides on.
    pub async fn gc_permit(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn writer_permits_are_shared() {
        let lock = Arc::new(GcLock::new());
        let a = lock.writer_permit().await;
        let b = lock.writer_permit().await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn gc_permit_excludes_writers() {
        let lock = GcLock::new();
        let writer = lock.writer_permit().await;
        let gc_attempt = lock.inner.try_write();
        assert!(gc_attempt.is_err());
        drop(writer);
        assert!(lock.inner.try_write().is_ok());
    }
}
