//! Per-key serial lock with fair queueing.
//!
//! `with_key_lock` serializes work per key: strictly single-writer per key,
//! different keys run concurrently. Waiters wake in enqueue order (tokio's
//! mutex is fair), and exactly one successor wakes per release. In-process
//! only; multi-process safety is a documented non-goal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

/// A mapping from key to a FIFO-fair lock.
#[derive(Debug, Default)]
pub struct KeyedMutex {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The closure's future runs to completion before the next waiter on the
    /// same key wakes. Callers must not re-enter the same key from inside
    /// `f`; doing so deadlocks, as with any non-reentrant lock.
    pub async fn with_key_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = entry.lock().await;
        let result = f().await;
        drop(guard);

        // Drop the map entry once nobody else holds a handle to it. Two
        // strong counts remain when idle: the map's and ours.
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            if Arc::ptr_eq(existing, &entry) && Arc::strong_count(existing) <= 2 {
                entries.remove(key);
            }
        }

        result
    }

    /// Number of keys with live lock state. Exposed for tests.
    pub async fn key_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}
