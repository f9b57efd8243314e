//! Sharded per-session lock table.
//!
//! Status transitions and progress writes for one session must never run
//! concurrently, but locking a single global map would serialize unrelated
//! sessions. The table is split into a fixed number of shards, each
//! guarding its slice of per-session mutexes, so contention stays bounded
//! across thousands of concurrent sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;

const SHARD_COUNT: usize = 16;

/// Sharded map of per-session exclusive locks.
pub struct LockTable {
    shards: Vec<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| StdMutex::new(HashMap::new())).collect(),
        }
    }

    /// Fetch (or create) the exclusive lock for a session.
    ///
    /// The returned handle stays valid even if the entry is later released;
    /// waiters holding it simply finish against the old mutex.
    #[must_use]
    pub fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let shard = &self.shards[shard_index(session_id)];
        let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop the lock entry for a session that reached a terminal status.
    ///
    /// Terminal sessions reject every further mutation during validation,
    /// so a fresh mutex handed out after release cannot cause a lost write.
    pub fn release(&self, session_id: &str) {
        let shard = &self.shards[shard_index(session_id)];
        shard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    /// Number of live lock entries, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Whether no lock entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// FNV-1a over the session id, folded into a shard index.
fn shard_index(session_id: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in session_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    usize::try_from(hash % SHARD_COUNT as u64).unwrap_or(0)
}
