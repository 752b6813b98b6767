//! Counter storage backends.
//!
//! The admission engine only talks to the [`CounterStore`] trait, so any
//! backend honouring the same contract can replace [`MemoryStore`].

mod memory;

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors reported by a [`CounterStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key is absent or has expired.
    #[error("value is not found by key")]
    NotFound,

    #[error("key is empty")]
    EmptyKey,

    /// The stored value could not be parsed as a decimal integer.
    #[error("value by key {key} is not integer")]
    NotInteger { key: String },
}

/// Outcome of a successful [`CounterStore::inc`] or [`CounterStore::decr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// The key was absent and has been initialised to the returned value.
    Created(i64),
    /// An existing counter was changed to the returned value.
    Updated(i64),
}

impl CounterUpdate {
    pub fn value(self) -> i64 {
        match self {
            CounterUpdate::Created(v) | CounterUpdate::Updated(v) => v,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, CounterUpdate::Created(_))
    }
}

/// A concurrency-safe key/value store of integer counters with per-key TTL.
///
/// A `ttl` of `None` or zero means the entry lives until it is deleted. When a
/// TTL is supplied and no expiry is armed for the key yet, the write arms one;
/// writes made while an expiry is pending leave it untouched.
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Bytes, StoreError>;

    fn set(&self, key: &[u8], value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Increment the counter stored under `key`, creating it at `1` if absent.
    fn inc(&self, key: &[u8], ttl: Option<Duration>) -> Result<CounterUpdate, StoreError>;

    /// Decrement the counter stored under `key`, creating it at `-1` if absent.
    fn decr(&self, key: &[u8], ttl: Option<Duration>) -> Result<CounterUpdate, StoreError>;

    fn has(&self, key: &[u8]) -> bool;

    /// Remove the given keys and cancel their pending expiry. Missing keys are
    /// ignored.
    fn del(&self, keys: &[&[u8]]) -> Result<(), StoreError>;

    /// Remove every entry and cancel every pending expiry.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Parse a stored counter value.
pub fn parse_counter(key: &[u8], raw: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::NotInteger {
            key: String::from_utf8_lossy(key).into_owned(),
        })
}
