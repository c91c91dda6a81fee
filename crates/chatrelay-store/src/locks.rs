//! Per-user serialization of read-modify-write cycles.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Held for the whole read-to-write-back span of one turn or delete.
///
/// Releasing the last guard of a user drops that user's lock entry, so the
/// table only holds users with a turn in flight.
pub struct UserGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    table: Arc<LockTable>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters keep their own clone of the mutex, so a contended entry survives.
        self.table
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[derive(Default)]
pub struct UserLocks {
    table: Arc<LockTable>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: &str) -> UserGuard {
        let lock = self
            .table
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // The map shard guard is released before awaiting.
        let guard = lock.lock_owned().await;

        UserGuard {
            guard: Some(guard),
            user_id: user_id.to_string(),
            table: self.table.clone(),
        }
    }

    /// Drop lock entries no task currently holds or waits on.
    pub fn prune_idle(&self) {
        self.table.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
