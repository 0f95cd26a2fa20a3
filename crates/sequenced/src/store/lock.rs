use crate::{CounterKey, Error, Result, Scope};
use core::{fmt, time::Duration};
use parking_lot::{Condvar, Mutex};
use std::{collections::HashMap, time::Instant};

pub(crate) type TxId = u64;

/// A lockable resource inside a [`MemoryStore`](crate::MemoryStore).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum LockKey {
    Scope { table: &'static str, scope: Scope },
    Counter(CounterKey),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope { table, scope } => write!(f, "{table} [{scope}]"),
            Self::Counter(key) => write!(f, "counter {key}"),
        }
    }
}

/// Exclusive, transaction-owned locks with timed waits.
///
/// Ownership is recorded per transaction id, so re-acquiring a held key is a
/// no-op and nested savepoints share their outer transaction's locks.
#[derive(Default)]
pub(crate) struct LockManager {
    owners: Mutex<HashMap<LockKey, TxId>>,
    released: Condvar,
}

impl LockManager {
    /// Blocks until `tx` owns `key` or `timeout` elapses.
    ///
    /// Returns `true` if the key was newly acquired, `false` if `tx` already
    /// held it.
    pub(crate) fn acquire(&self, key: &LockKey, tx: TxId, timeout: Duration) -> Result<bool> {
        let started = Instant::now();
        // Too far out to represent: wait without a deadline.
        let deadline = started.checked_add(timeout);
        let mut owners = self.owners.lock();
        loop {
            match owners.get(key) {
                None => {
                    owners.insert(key.clone(), tx);
                    return Ok(true);
                }
                Some(&owner) if owner == tx => return Ok(false),
                Some(_) => {
                    let timed_out = match deadline {
                        Some(deadline) => {
                            self.released.wait_until(&mut owners, deadline).timed_out()
                        }
                        None => {
                            self.released.wait(&mut owners);
                            false
                        }
                    };
                    if timed_out && owners.get(key).is_some_and(|&owner| owner != tx) {
                        return Err(Error::LockTimeout {
                            resource: key.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
    }

    /// Releases every key in `keys` owned by `tx` and wakes all waiters.
    pub(crate) fn release_all(&self, keys: &[LockKey], tx: TxId) {
        if keys.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for key in keys {
            if owners.get(key) == Some(&tx) {
                owners.remove(key);
            }
        }
        drop(owners);
        self.released.notify_all();
    }
}
