use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use throttlegate_common::LimitsConfig;

use crate::state::SharedState;

/// GET /api/config
///
/// Returns the active rate limit rules.
pub async fn get_config(State(state): State<SharedState>) -> Json<LimitsConfig> {
    Json(state.limiter.config())
}

/// PUT /api/config
///
/// Validates a full rule set and swaps it in atomically. Existing counters
/// are kept for rule ids present in both sets.
pub async fn update_config(
    State(state): State<SharedState>,
    Json(new_config): Json<LimitsConfig>,
) -> impl IntoResponse {
    if let Err(e) = new_config.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": format!("validation failed: {}", e)
            })),
        );
    }

    let rules = new_config.by_ip.data.len();
    state.limiter.update_config(new_config);
    tracing::info!(rules, "rate limit rules updated via admin API");

    (
        StatusCode::OK,
        Json(json!({
            "status": "updated",
            "rules": rules
        })),
    )
}
