//! Per-user locks guarding access-key creation.
//!
//! Creating an auto-generated key is a read-then-create sequence on the
//! gateway; two creations for the same user running in parallel can both see
//! the same "before" state. Callers hold the user's lock across the sequence.
//! Each user gets their own lock so unrelated users never wait on each other.
//!
//! This crate has no access-key adapter of its own. Key-creating code built
//! on it takes the lock from [`Provider::key_locks`], so every operation of
//! one provider shares a single registry.
//!
//! [`Provider::key_locks`]: crate::provider::Provider::key_locks

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct KeyCreationLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyCreationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `user_id`. Released when the guard
    /// is dropped.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held while waiting.
        let lock = Arc::clone(self.locks.entry(user_id.to_string()).or_default().value());
        debug!("Waiting for key creation lock of user {}", user_id);
        lock.lock_owned().await
    }

    /// Number of users that have ever taken a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
