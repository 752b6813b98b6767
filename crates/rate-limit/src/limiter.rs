//! Admission decisions over a hot-swappable rule set.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use throttlegate_common::LimitsConfig;
use tracing::{debug, info, warn};

use crate::matcher::{RuleSet, WILDCARD};
use crate::storage::{parse_counter, CounterStore};

/// The admission decision engine.
///
/// Holds the active [`RuleSet`] behind an [`ArcSwap`] so reloads never block
/// request handling, and keeps one counter per rule id in a [`CounterStore`].
/// Cheap to clone; clones share rules and counters.
#[derive(Clone)]
pub struct RateLimit {
    rules: Arc<ArcSwap<RuleSet>>,
    store: Arc<dyn CounterStore>,
}

impl RateLimit {
    pub fn new(config: LimitsConfig, store: Arc<dyn CounterStore>) -> Self {
        let rules = RuleSet::compile(config);
        info!(
            title = %rules.config().title,
            rules = rules.len(),
            "rate limit rules loaded"
        );
        Self {
            rules: Arc::new(ArcSwap::from_pointee(rules)),
            store,
        }
    }

    /// Compile `config` and atomically replace the active rule set.
    ///
    /// Counters are keyed by rule id, so rules that survive the reload keep
    /// their current counts.
    pub fn update_config(&self, config: LimitsConfig) {
        let rules = RuleSet::compile(config);
        info!(
            title = %rules.config().title,
            rules = rules.len(),
            "rate limit rules replaced"
        );
        self.rules.store(Arc::new(rules));
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> LimitsConfig {
        self.rules.load().config().clone()
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Ids of every rule matching the request, in declaration order.
    pub fn resolve_rule_ids(&self, protocol: &str, method: &str, url: &str, ip: &str) -> Vec<String> {
        self.rules.load().resolve(protocol, method, url, ip)
    }

    /// Whether any of `ids` has already reached its limit.
    ///
    /// Unknown ids, missing counters and unreadable counters never limit.
    pub fn is_limited_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        let rules = self.rules.load();

        for id in ids {
            let id = id.as_ref();
            let Some(rule) = rules.rule(id) else {
                continue;
            };

            let count = match self.store.get(id.as_bytes()) {
                Ok(raw) => match parse_counter(id.as_bytes(), &raw) {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(rule_id = id, error = %err, "ignoring unreadable counter");
                        continue;
                    }
                },
                Err(_) => continue,
            };

            if count >= 0 && (count as u64) >= rule.limit {
                debug!(rule_id = id, count, limit = rule.limit, "limit reached");
                return true;
            }
        }

        false
    }

    /// Increment the counter of the first id that names a configured rule.
    ///
    /// The counter expires `block_time` seconds after it was created. Returns
    /// the new count, or `0` when no id resolves or the increment fails.
    pub fn inc_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> i64 {
        let rules = self.rules.load();

        let Some(rule) = ids.iter().find_map(|id| rules.rule(id.as_ref())) else {
            return 0;
        };

        let ttl = Duration::from_secs(rule.block_time);
        match self.store.inc(rule.id.as_bytes(), Some(ttl)) {
            Ok(update) => {
                if update.is_created() {
                    debug!(rule_id = %rule.id, block_time = rule.block_time, "counter window opened");
                }
                update.value()
            }
            Err(err) => {
                warn!(rule_id = %rule.id, error = %err, "failed to increment counter");
                0
            }
        }
    }

    /// Drop the counters of every id that names a configured rule.
    pub fn clear_by_ids<S: AsRef<str>>(&self, ids: &[S]) {
        let rules = self.rules.load();

        let keys: Vec<&[u8]> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| rules.rule(id).is_some())
            .map(str::as_bytes)
            .collect();

        if keys.is_empty() {
            return;
        }

        if let Err(err) = self.store.del(&keys) {
            warn!(error = %err, "failed to clear counters");
        }
    }

    /// Clear the counters of every rule whose mask contains `ip`.
    ///
    /// Returns the ids that were cleared.
    pub fn reset_ip(&self, ip: &str) -> Vec<String> {
        let ids = self.resolve_rule_ids(WILDCARD, WILDCARD, WILDCARD, ip);
        self.clear_by_ids(&ids);
        info!(ip, cleared = ids.len(), "counters reset for ip");
        ids
    }
}
