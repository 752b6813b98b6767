use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::{parse_counter, CounterStore, CounterUpdate, StoreError};

/// An expiry task scheduled for one key.
struct ArmedTimer {
    /// Distinguishes this arm from a later one made after delete-and-recreate.
    generation: u64,
    task: AbortHandle,
}

struct Inner {
    data: RwLock<HashMap<Vec<u8>, Bytes>>,
    timers: DashMap<Vec<u8>, ArmedTimer>,
    next_generation: AtomicU64,
    runtime: Handle,
}

/// In-process [`CounterStore`] with timer-driven expiry.
///
/// Every key written with a TTL owns exactly one tokio task that sleeps for
/// the TTL and then removes the entry. There is no periodic sweep.
///
/// Lock order is always `data` then `timers`; the expiry task follows the same
/// order, so an entry is removed at most once per armed timer.
///
/// The store is cheaply cloneable and clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create a store whose expiry tasks run on `runtime`.
    ///
    /// The store itself may be used from any thread; only the timers need
    /// the runtime.
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(HashMap::new()),
                timers: DashMap::new(),
                next_generation: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Number of keys with a pending expiry.
    #[cfg(test)]
    pub(crate) fn armed_timers(&self) -> usize {
        self.inner.timers.len()
    }

    fn step(&self, key: &[u8], ttl: Option<Duration>, delta: i64) -> Result<CounterUpdate, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let mut data = self.inner.data.write();
        let current = data
            .get(key)
            .map(|raw| parse_counter(key, raw))
            .transpose()?;

        let update = match current {
            None => CounterUpdate::Created(delta),
            Some(value) => CounterUpdate::Updated(value.saturating_add(delta)),
        };
        data.insert(key.to_vec(), Bytes::from(update.value().to_string()));
        self.inner.arm(key, ttl);

        trace!(key = %String::from_utf8_lossy(key), value = update.value(), "counter updated");
        Ok(update)
    }
}

impl Inner {
    /// Schedule expiry of `key` unless one is already pending.
    ///
    /// Must be called with the `data` write lock held.
    fn arm(self: &Arc<Self>, key: &[u8], ttl: Option<Duration>) {
        let Some(ttl) = ttl.filter(|d| !d.is_zero()) else {
            return;
        };

        let Entry::Vacant(slot) = self.timers.entry(key.to_vec()) else {
            return;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let store: Weak<Inner> = Arc::downgrade(self);
        let owned_key = key.to_vec();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(store) = store.upgrade() {
                store.expire(&owned_key, generation);
            }
        });

        slot.insert(ArmedTimer {
            generation,
            task: task.abort_handle(),
        });
        trace!(key = %String::from_utf8_lossy(key), ttl_secs = ttl.as_secs(), "expiry armed");
    }

    fn expire(&self, key: &[u8], generation: u64) {
        let mut data = self.data.write();
        if self
            .timers
            .remove_if(key, |_, armed| armed.generation == generation)
            .is_some()
        {
            data.remove(key);
            debug!(key = %String::from_utf8_lossy(key), "counter expired");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for armed in self.timers.iter() {
            armed.task.abort();
        }
    }
}

impl CounterStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Bytes, StoreError> {
        self.inner
            .data
            .read()
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn set(&self, key: &[u8], value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let mut data = self.inner.data.write();
        data.insert(key.to_vec(), value);
        self.inner.arm(key, ttl);
        Ok(())
    }

    fn inc(&self, key: &[u8], ttl: Option<Duration>) -> Result<CounterUpdate, StoreError> {
        self.step(key, ttl, 1)
    }

    fn decr(&self, key: &[u8], ttl: Option<Duration>) -> Result<CounterUpdate, StoreError> {
        self.step(key, ttl, -1)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.inner.data.read().contains_key(key)
    }

    fn del(&self, keys: &[&[u8]]) -> Result<(), StoreError> {
        let cancelled: Vec<ArmedTimer> = {
            let mut data = self.inner.data.write();
            keys.iter()
                .filter_map(|key| {
                    data.remove(*key);
                    self.inner.timers.remove(*key).map(|(_, armed)| armed)
                })
                .collect()
        };

        for armed in cancelled {
            armed.task.abort();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let cancelled: Vec<ArmedTimer> = {
            let mut data = self.inner.data.write();
            data.clear();

            let keys: Vec<Vec<u8>> = self
                .inner
                .timers
                .iter()
                .map(|armed| armed.key().clone())
                .collect();
            keys.iter()
                .filter_map(|key| self.inner.timers.remove(key).map(|(_, armed)| armed))
                .collect()
        };

        let count = cancelled.len();
        for armed in cancelled {
            armed.task.abort();
        }
        debug!(cancelled_timers = count, "memory store cleared");
        Ok(())
    }
}
