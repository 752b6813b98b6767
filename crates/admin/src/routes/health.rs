use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/health
///
/// Returns uptime, version and the number of active rules.
pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let rules = state.limiter.config().by_ip.data.len();

    Json(json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "rules": rules,
        "version": env!("CARGO_PKG_VERSION")
    }))
}
