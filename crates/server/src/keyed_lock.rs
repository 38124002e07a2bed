use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    // holders plus queued waiters
    users: usize,
}

type LockMap = Arc<Mutex<HashMap<String, LockEntry>>>;

/// One async mutex per key, created on demand and dropped once nobody holds
/// or waits for it.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: LockMap,
}

/// Counts one user of a key from the moment it starts waiting. Dropping it
/// (guard released or wait cancelled) removes the entry with the last user.
struct Ticket {
    key: String,
    locks: LockMap,
}

pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let (lock, ticket) = {
            let mut locks = self.locks.lock();
            let entry = locks.entry(key.to_string()).or_insert_with(|| LockEntry {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            let ticket = Ticket {
                key: key.to_string(),
                locks: Arc::clone(&self.locks),
            };
            (Arc::clone(&entry.lock), ticket)
        };
        let guard = lock.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        let idle = match locks.get_mut(&self.key) {
            Some(entry) => {
                entry.users -= 1;
                entry.users == 0
            }
            None => false,
        };
        if idle {
            locks.remove(&self.key);
        }
    }
}
