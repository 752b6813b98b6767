use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use throttlegate_rate_limit::storage::parse_counter;

use crate::state::SharedState;

/// GET /api/stats
///
/// Traffic totals plus the live counter of every configured rule.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let uptime_secs = state.start_time.elapsed().as_secs();
    let total_requests = state.metrics.requests_total.get();
    let rate_limited_requests = state.metrics.rate_limited_total.get();
    let resets = state.metrics.resets_total.get();

    let requests_per_second = if uptime_secs > 0 {
        total_requests as f64 / uptime_secs as f64
    } else {
        0.0
    };

    let store = state.limiter.store();
    let rules: Vec<Value> = state
        .limiter
        .config()
        .by_ip
        .data
        .iter()
        .map(|rule| {
            let count = store
                .get(rule.id.as_bytes())
                .ok()
                .and_then(|raw| parse_counter(rule.id.as_bytes(), &raw).ok())
                .unwrap_or(0);
            json!({
                "id": rule.id,
                "mask": rule.mask,
                "limit": rule.limit,
                "block_time": rule.block_time,
                "count": count,
                "limited": count >= 0 && (count as u64) >= rule.limit,
            })
        })
        .collect();

    Json(json!({
        "total_requests": total_requests,
        "rate_limited_requests": rate_limited_requests,
        "resets": resets,
        "uptime_secs": uptime_secs,
        "requests_per_second": requests_per_second,
        "rules": rules
    }))
}
