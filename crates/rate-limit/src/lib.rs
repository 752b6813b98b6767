//! Per-IP admission control.
//!
//! Requests are matched against an ordered list of rules by source IP
//! (CIDR mask), protocol, method and URL. Each rule owns one counter that
//! lives for `block_time` seconds after the first matching request:
//!
//! - [`storage`] -- the [`CounterStore`] contract and the in-memory
//!   [`MemoryStore`] with arm-once TTL expiry.
//! - [`matcher`] -- compiles a [`LimitsConfig`](throttlegate_common::LimitsConfig)
//!   into a [`RuleSet`] and resolves the rule ids for a request.
//! - [`limiter`] -- the [`RateLimit`] engine combining both behind a
//!   hot-swappable configuration.

pub mod limiter;
pub mod matcher;
pub mod storage;

pub use limiter::RateLimit;
pub use matcher::{MatchError, RuleSet, WILDCARD};
pub use storage::{CounterStore, CounterUpdate, MemoryStore, StoreError};
