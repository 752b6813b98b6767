//! Rule matching: maps request attributes to the ids of the rules that apply.
//!
//! A [`RuleSet`] is compiled once from a [`LimitsConfig`]. Masks, exclusion
//! lists and regular expressions are parsed up front; anything malformed is
//! logged and skipped so that a bad rule can never block traffic on its own.

use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use throttlegate_common::{LimitHandlerConfig, LimitsConfig, RuleConfig};

/// Value that matches any protocol, method or URL in a query.
pub const WILDCARD: &str = "*";

/// Problems found while compiling a rule. Never surfaced to request handling.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid pattern {pattern:?} in rule {rule_id}: {source}")]
    InvalidPattern {
        rule_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid mask {mask:?} in rule {rule_id}")]
    InvalidMask { rule_id: String, mask: String },
}

/// A compiled, immutable rule set.
#[derive(Debug)]
pub struct RuleSet {
    config: LimitsConfig,
    rules: Vec<CompiledRule>,
    excluded: Vec<IpNet>,
}

#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub(crate) id: String,
    pub(crate) limit: u64,
    pub(crate) block_time: u64,
    mask: Mask,
    excluded: Vec<IpNet>,
    handlers: Vec<CompiledHandler>,
}

#[derive(Debug)]
enum Mask {
    Any,
    Net(IpNet),
    /// The configured mask did not parse; the rule never matches.
    Invalid,
}

#[derive(Debug)]
struct CompiledHandler {
    url: Pattern,
    /// Lower-cased; empty matches any method.
    method: String,
    protocol: Pattern,
}

#[derive(Debug)]
enum Pattern {
    Any,
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    fn compile(rule_id: &str, raw: &str, is_regex: bool) -> Result<Self, MatchError> {
        if raw.is_empty() {
            return Ok(Pattern::Any);
        }
        if !is_regex {
            return Ok(Pattern::Literal(raw.to_lowercase()));
        }
        Regex::new(raw)
            .map(Pattern::Regex)
            .map_err(|source| MatchError::InvalidPattern {
                rule_id: rule_id.to_string(),
                pattern: raw.to_string(),
                source,
            })
    }

    /// `input` must already be lower-cased.
    fn is_match(&self, input: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Literal(literal) => literal == input,
            Pattern::Regex(re) => re.is_match(input),
        }
    }
}

impl CompiledHandler {
    fn compile(rule_id: &str, handler: &LimitHandlerConfig) -> Result<Option<Self>, MatchError> {
        // A handler without a URL never matches anything.
        if handler.url.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            url: Pattern::compile(rule_id, &handler.url, handler.regexp)?,
            method: handler.method.to_lowercase(),
            protocol: Pattern::compile(rule_id, &handler.protocol, handler.protocol_regexp)?,
        }))
    }

    fn matches(&self, protocol: &str, method: &str, url: &str) -> bool {
        (url == WILDCARD || self.url.is_match(url))
            && (self.method.is_empty() || self.method == method)
            && self.protocol.is_match(protocol)
    }
}

impl CompiledRule {
    fn compile(rule: &RuleConfig) -> Self {
        let mask = if rule.mask.trim().is_empty() {
            Mask::Any
        } else {
            match rule.mask.trim().parse::<IpNet>() {
                Ok(net) => Mask::Net(net),
                Err(_) => {
                    let err = MatchError::InvalidMask {
                        rule_id: rule.id.clone(),
                        mask: rule.mask.clone(),
                    };
                    warn!(error = %err, "rule will be skipped");
                    Mask::Invalid
                }
            }
        };

        let handlers = rule
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(position, handler)| {
                match CompiledHandler::compile(&rule.id, handler) {
                    Ok(Some(compiled)) => Some(compiled),
                    Ok(None) => {
                        debug!(rule_id = %rule.id, position, "handler without url ignored");
                        None
                    }
                    Err(err) => {
                        warn!(error = %err, position, "handler will be skipped");
                        None
                    }
                }
            })
            .collect();

        Self {
            id: rule.id.clone(),
            limit: rule.limit,
            block_time: rule.block_time,
            mask,
            excluded: parse_networks(&rule.exclude_ips, &rule.id),
            handlers,
        }
    }

    fn mask_contains(&self, ip: Option<IpAddr>) -> bool {
        match &self.mask {
            Mask::Any => true,
            Mask::Net(net) => ip.is_some_and(|ip| net.contains(&ip)),
            Mask::Invalid => false,
        }
    }
}

impl RuleSet {
    /// Compile `config`. Malformed masks, exclusions and patterns are logged
    /// and disabled rather than rejected.
    pub fn compile(config: LimitsConfig) -> Self {
        let rules = config.by_ip.data.iter().map(CompiledRule::compile).collect();
        let excluded = parse_networks(&config.by_ip.exclude_ips, "global");

        Self {
            config,
            rules,
            excluded,
        }
    }

    /// The configuration this set was compiled from.
    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn rule(&self, id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// Resolve the ids of every rule that applies to the request, in
    /// declaration order.
    ///
    /// Passing [`WILDCARD`] for protocol, method and url returns every rule
    /// whose mask contains `source_ip`, regardless of handlers and exclusions.
    pub fn resolve(&self, protocol: &str, method: &str, url: &str, source_ip: &str) -> Vec<String> {
        let protocol = protocol.to_lowercase();
        let method = method.to_lowercase();
        let url = url.to_lowercase();
        let ip = source_ip.trim().parse::<IpAddr>().ok();
        let wildcard = protocol == WILDCARD && method == WILDCARD && url == WILDCARD;
        let globally_excluded = !wildcard && contains_ip(&self.excluded, ip);

        let mut ids = Vec::new();
        for rule in &self.rules {
            if !rule.mask_contains(ip) {
                continue;
            }

            if wildcard {
                ids.push(rule.id.clone());
                continue;
            }

            if globally_excluded || contains_ip(&rule.excluded, ip) {
                continue;
            }

            if rule
                .handlers
                .iter()
                .any(|handler| handler.matches(&protocol, &method, &url))
            {
                ids.push(rule.id.clone());
            }
        }
        ids
    }
}

fn contains_ip(networks: &[IpNet], ip: Option<IpAddr>) -> bool {
    ip.is_some_and(|ip| networks.iter().any(|net| net.contains(&ip)))
}

/// Parse a list of IPs or CIDRs. Bare addresses become /32 or /128 networks.
fn parse_networks(entries: &[String], owner: &str) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if let Ok(net) = trimmed.parse::<IpNet>() {
                Some(net)
            } else if let Ok(addr) = trimmed.parse::<IpAddr>() {
                Some(IpNet::from(addr))
            } else {
                warn!(owner, entry = trimmed, "skipping unparseable excluded IP");
                None
            }
        })
        .collect()
}
