use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::FORWARDED_FOR;

/// GET /run
///
/// Demo endpoint behind the rate limiter. Echoes the forwarded-for chain.
pub async fn run(headers: HeaderMap) -> Json<Value> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    Json(json!({
        "message": "Run response",
        "X-FORWARDED-FOR": forwarded
    }))
}
