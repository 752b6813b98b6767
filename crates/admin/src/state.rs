use std::sync::Arc;
use std::time::Instant;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use throttlegate_rate_limit::RateLimit;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// State shared by the request pipeline and the admin API.
pub struct AppState {
    pub limiter: RateLimit,
    pub metrics: GateMetrics,
    pub start_time: Instant,
}

/// Prometheus metrics collected by the gateway.
pub struct GateMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub rate_limited_total: IntCounter,
    pub request_duration: HistogramVec,
    pub rule_hits: IntCounterVec,
    pub resets_total: IntCounter,
}

impl GateMetrics {
    /// Create every collector and register it against a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "throttlegate_requests_total",
            "Total number of requests seen by the rate limiter",
        ))?;

        let rate_limited_total = IntCounter::with_opts(Opts::new(
            "throttlegate_rate_limited_total",
            "Total number of requests rejected with 429",
        ))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "throttlegate_request_duration_seconds",
                "Request processing duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["method", "status"],
        )?;

        let rule_hits = IntCounterVec::new(
            Opts::new(
                "throttlegate_rule_hits_total",
                "Requests counted against each rule",
            ),
            &["rule_id"],
        )?;

        let resets_total = IntCounter::with_opts(Opts::new(
            "throttlegate_resets_total",
            "Number of successful counter resets by IP",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(rule_hits.clone()))?;
        registry.register(Box::new(resets_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            request_duration,
            rule_hits,
            resets_total,
        })
    }
}

impl AppState {
    pub fn new(limiter: RateLimit) -> prometheus::Result<Self> {
        Ok(Self {
            limiter,
            metrics: GateMetrics::new()?,
            start_time: Instant::now(),
        })
    }
}
