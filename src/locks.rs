//! Per-route single-flight guard.
//!
//! Operator edits wait for the lock; the background sweep only tries it and
//! skips routes that are busy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct RouteLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl RouteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // slots nobody holds are dropped here
        locks.retain(|other, lock| *other == id || Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.slot(id).lock_owned().await
    }

    pub fn try_acquire(&self, id: Uuid) -> Option<OwnedMutexGuard<()>> {
        self.slot(id).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_acquire_fails_while_held() {
        let locks = RouteLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        assert!(locks.try_acquire(id).is_none());
        assert!(locks.try_acquire(Uuid::new_v4()).is_some());

        drop(guard);
        assert!(locks.try_acquire(id).is_some());
    }
}
