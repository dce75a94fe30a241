//! Cancellation, retries and per-asset locking

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use iwbridge_core::{AssetId, Result};

use crate::config::RetryPolicy;

/// Shared cancellation flag; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up
///
/// `on_retry(attempt, delay, error)` is called before each sleep. Returns
/// the result and the number of attempts made.
pub fn with_retry<T, F, R>(policy: &RetryPolicy, mut op: F, mut on_retry: R) -> (Result<T>, u32)
where
    F: FnMut() -> Result<T>,
    R: FnMut(u32, std::time::Duration, &iwbridge_core::Error),
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                on_retry(attempt, delay, &e);
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

/// Entries are pruned once the map grows past this many idle keys
const PRUNE_THRESHOLD: usize = 1024;

/// One mutex per asset identifier
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<AssetId, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `id`; callers hold `handle.lock()` for the critical section
    pub fn handle(&self, id: &AssetId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(id.clone()).or_default())
    }
}
