use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ThrottleError, ThrottleResult};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Reload `rate_limits` whenever the configuration file changes.
    #[serde(default = "default_true")]
    pub watch_config: bool,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub rate_limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            watch_config: true,
            admin: AdminConfig::default(),
            rate_limits: LimitsConfig::default(),
        }
    }
}

/// The admin API listener. Kept off the public listener since it can
/// replace the rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: default_admin_listen(),
        }
    }
}

/// The rule set consulted by the admission engine.
///
/// Replaced as a whole on every reload; never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub by_ip: ByIpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByIpConfig {
    /// IPs or CIDRs exempt from every rule.
    #[serde(default)]
    pub exclude_ips: Vec<String>,
    /// Rules in evaluation order.
    #[serde(default)]
    pub data: Vec<RuleConfig>,
}

/// One throttling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    #[serde(default)]
    pub handlers: Vec<LimitHandlerConfig>,
    #[serde(default)]
    pub limit: u64,
    /// Window length in seconds. Zero disables expiry of the counter.
    #[serde(default)]
    pub block_time: u64,
    /// CIDR the rule applies to; empty means every source IP.
    #[serde(default)]
    pub mask: String,
    #[serde(default)]
    pub exclude_ips: Vec<String>,
}

/// A (protocol, method, url) matcher inside a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitHandlerConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_regexp: bool,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    /// `url` is a regular expression rather than a literal path.
    #[serde(default)]
    pub regexp: bool,
}

// Default value helpers
fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ThrottleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> ThrottleResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> ThrottleResult<()> {
        if self.server.listen.trim().is_empty() {
            return Err(ThrottleError::Config(
                "server.listen must not be empty".to_string(),
            ));
        }
        if self.server.admin.listen.trim().is_empty() {
            return Err(ThrottleError::Config(
                "server.admin.listen must not be empty".to_string(),
            ));
        }
        if self.server.admin.listen.trim() == self.server.listen.trim() {
            return Err(ThrottleError::Config(
                "server.admin.listen must differ from server.listen".to_string(),
            ));
        }

        self.server.rate_limits.validate()
    }
}

impl LimitsConfig {
    /// Check the invariants the engine relies on: every rule has a non-empty,
    /// unique id.
    ///
    /// Malformed masks and patterns are not rejected here; the matcher skips
    /// them at runtime.
    pub fn validate(&self) -> ThrottleResult<()> {
        let mut seen = HashSet::with_capacity(self.by_ip.data.len());

        for (position, rule) in self.by_ip.data.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(ThrottleError::EmptyRuleId(position));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ThrottleError::DuplicateRuleId(rule.id.clone()));
            }
            if rule.handlers.is_empty() {
                tracing::warn!(rule_id = %rule.id, "rule has no handlers and only matches wildcard queries");
            }
        }

        Ok(())
    }
}
