//! Exclusive, time-bounded access to the shared destination store.
//!
//! Merge runs are scheduled on a timer and can also be invoked manually, so
//! two runs can race for the same destination. A run must hold this lock
//! before mutating the merged sheet; failing to acquire it within the bound
//! aborts the run before any mutation.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Interval between acquisition attempts while waiting for the lock.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("could not acquire exclusive access to the destination store within {waited:?}")]
    Timeout { waited: Duration },
    #[error("destination store lock poisoned by an earlier panic")]
    Poisoned,
}

/// Mutex wrapper with bounded-wait acquisition.
#[derive(Debug, Default)]
pub struct StoreLock<S> {
    inner: Mutex<S>,
}

impl<S> StoreLock<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Acquire exclusive access, waiting at most `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Result<MutexGuard<'_, S>, LockError> {
        let start = Instant::now();
        loop {
            match self.inner.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(LockError::Timeout { waited });
                    }
                    thread::sleep(ACQUIRE_POLL_INTERVAL.min(timeout - waited));
                }
                Err(TryLockError::Poisoned(_)) => return Err(LockError::Poisoned),
            }
        }
    }

    /// Consume the lock and return the store (for handing the final state
    /// back to persistence once no other holder can exist).
    pub fn into_inner(self) -> Result<S, LockError> {
        self.inner.into_inner().map_err(|_| LockError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_succeeds_when_uncontended() {
        let lock = StoreLock::new(1u32);
        let guard = lock.acquire(Duration::from_millis(10)).unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn acquire_times_out_while_held() {
        let lock = Arc::new(StoreLock::new(()));
        let held = lock.acquire(Duration::from_millis(10)).unwrap();
        let contender = Arc::clone(&lock);
        let result = thread::spawn(move || contender.acquire(Duration::from_millis(60)).map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(LockError::Timeout { .. })));
        drop(held);
        assert!(lock.acquire(Duration::from_millis(10)).is_ok());
    }
}
