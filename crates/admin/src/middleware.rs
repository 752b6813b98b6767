//! Rate limiting applied in front of every application route.

use std::borrow::Cow;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::state::SharedState;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Body returned with every 429.
pub const TOO_MANY_REQUESTS: &str = "Too many requests";

/// First entry of `X-Forwarded-For`, or an empty string.
pub fn forwarded_ip(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Path as matched by the rules: percent-decoded, or raw if the escapes do
/// not form valid UTF-8.
pub fn decoded_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

/// The reset endpoint is never throttled, or a blocked client could not be
/// unblocked.
fn is_exempt(path: &str) -> bool {
    path == "/reset"
}

/// Check the first matching rule before counting the request against it.
///
/// Rejected requests are still counted, so a client that keeps retrying
/// stays blocked until the window expires.
pub async fn rate_limit(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    if is_exempt(uri.path()) {
        return next.run(req).await;
    }

    state.metrics.requests_total.inc();

    let ip = forwarded_ip(req.headers());
    let protocol = format!("{:?}", req.version());
    let path = decoded_path(uri.path());
    let ids = state
        .limiter
        .resolve_rule_ids(&protocol, method.as_str(), &path, &ip);

    let response = match ids.first() {
        Some(id) => {
            let first = std::slice::from_ref(id);
            let limited = state.limiter.is_limited_by_ids(first);
            let count = state.limiter.inc_by_ids(first);
            state.metrics.rule_hits.with_label_values(&[id.as_str()]).inc();

            if limited {
                state.metrics.rate_limited_total.inc();
                info!(client_ip = %ip, rule_id = %id, count, "request rate limited");
                (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS).into_response()
            } else {
                debug!(client_ip = %ip, rule_id = %id, count, "request counted");
                next.run(req).await
            }
        }
        None => next.run(req).await,
    };

    let elapsed = started.elapsed();
    let status = response.status();
    state
        .metrics
        .request_duration
        .with_label_values(&[method.as_str(), status.as_str()])
        .observe(elapsed.as_secs_f64());
    info!(
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "request handled"
    );

    response
}
