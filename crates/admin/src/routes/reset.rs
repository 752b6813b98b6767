use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub ip: String,
}

/// POST /reset
///
/// Clears the counters of every rule whose mask covers `ip`.
pub async fn reset(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: ResetRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "undecodable reset body");
            return (
                StatusCode::BAD_REQUEST,
                format!("Wrong params Decode. {}", e),
            )
                .into_response();
        }
    };

    let ip = request.ip.trim();
    if ip.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Wrong params. IP param not found.",
        )
            .into_response();
    }

    let cleared = state.limiter.reset_ip(ip);
    state.metrics.resets_total.inc();
    tracing::info!(ip, cleared = ?cleared, "rate limit counters reset");

    Json(json!({ "result": "Ok" })).into_response()
}
