use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use throttlegate_admin::{build_admin_router, build_router, new_shared_state};
use throttlegate_common::{ByIpConfig, LimitHandlerConfig, LimitsConfig, RuleConfig};
use throttlegate_rate_limit::{MemoryStore, RateLimit};
use tokio::runtime::Handle;
use tower::ServiceExt;

fn limits() -> LimitsConfig {
    LimitsConfig {
        title: "api tests".to_string(),
        by_ip: ByIpConfig {
            exclude_ips: vec![],
            data: vec![RuleConfig {
                id: "R1".to_string(),
                handlers: vec![LimitHandlerConfig {
                    method: "GET".to_string(),
                    url: "/run".to_string(),
                    ..Default::default()
                }],
                limit: 3,
                block_time: 10,
                mask: "10.0.0.0/8".to_string(),
                exclude_ips: vec![],
            }],
        },
    }
}

fn app() -> Router {
    routers(limits()).0
}

/// Public and admin routers sharing one engine.
fn routers(config: LimitsConfig) -> (Router, Router) {
    let limiter = RateLimit::new(config, Arc::new(MemoryStore::new(Handle::current())));
    let state = new_shared_state(limiter).unwrap();
    (build_router(state.clone()), build_admin_router(state))
}

async fn put_config(app: &Router, config: &LimitsConfig, ip: &str) -> StatusCode {
    let req = Request::put("/api/config")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(serde_json::to_vec(config).unwrap()))
        .unwrap();
    app.clone().oneshot(req).await.unwrap().status()
}

async fn get_run(app: &Router, ip: &str) -> StatusCode {
    let req = Request::get("/run")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(req).await.unwrap().status()
}

async fn post_reset(app: &Router, body: &str) -> (StatusCode, String) {
    let req = Request::post("/reset")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_fourth_request_is_rejected_until_window_expires() {
    let app = app();

    for _ in 0..3 {
        assert_eq!(get_run(&app, "10.1.2.3").await, StatusCode::OK);
    }

    let req = Request::get("/run")
        .header("x-forwarded-for", "10.1.2.3")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"Too many requests");

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(get_run(&app, "10.1.2.3").await, StatusCode::OK);
}

#[tokio::test]
async fn test_first_forwarded_entry_is_the_client() {
    let app = app();

    for _ in 0..3 {
        assert_eq!(get_run(&app, "10.0.0.1, 192.168.0.1").await, StatusCode::OK);
    }
    assert_eq!(get_run(&app, "10.0.0.1, 192.168.0.1").await, StatusCode::TOO_MANY_REQUESTS);
    // Unmatched clients share nothing with the blocked rule.
    assert_eq!(get_run(&app, "192.168.0.1, 10.0.0.1").await, StatusCode::OK);
    assert_eq!(get_run(&app, "").await, StatusCode::OK);
}

#[tokio::test]
async fn test_run_echoes_forwarded_for() {
    let app = app();
    let req = Request::get("/run")
        .header("x-forwarded-for", "172.16.0.9, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({"message": "Run response", "X-FORWARDED-FOR": "172.16.0.9, 10.0.0.1"})
    );
}

#[tokio::test]
async fn test_reset_unblocks_ip() {
    let app = app();

    for _ in 0..4 {
        get_run(&app, "10.9.9.9").await;
    }
    assert_eq!(get_run(&app, "10.9.9.9").await, StatusCode::TOO_MANY_REQUESTS);

    let (status, body) = post_reset(&app, r#"{"ip": "10.9.9.9"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"result": "Ok"}));

    assert_eq!(get_run(&app, "10.9.9.9").await, StatusCode::OK);
}

#[tokio::test]
async fn test_reset_rejects_bad_bodies() {
    let app = app();

    let (status, body) = post_reset(&app, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Wrong params Decode"), "{body}");

    let (status, body) = post_reset(&app, "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("IP param not found"), "{body}");

    let (status, body) = post_reset(&app, r#"{"ip": ""}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("IP param not found"), "{body}");
}

#[tokio::test]
async fn test_reset_of_unknown_ip_succeeds() {
    let app = app();
    let (status, _) = post_reset(&app, r#"{"ip": "8.8.8.8"}"#).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_stats() {
    let (public, admin) = routers(limits());
    get_run(&public, "10.0.0.2").await;

    let health = get_json(&admin, "/api/health").await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["rules"], 1);

    let stats = get_json(&admin, "/api/stats").await;
    assert_eq!(stats["total_requests"], 1);
    assert_eq!(stats["rules"][0]["id"], "R1");
    assert_eq!(stats["rules"][0]["count"], 1);
    assert_eq!(stats["rules"][0]["limited"], false);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (public, admin) = routers(limits());
    for _ in 0..4 {
        get_run(&public, "10.0.0.3").await;
    }

    let req = Request::get("/api/metrics").body(Body::empty()).unwrap();
    let resp = admin.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("throttlegate_rate_limited_total 1"), "{text}");
    assert!(text.contains("throttlegate_requests_total 4"), "{text}");
}

#[tokio::test]
async fn test_config_round_trip_and_validation() {
    let (public, admin) = routers(limits());

    let current = get_json(&admin, "/api/config").await;
    assert_eq!(current["title"], "api tests");

    let mut next = limits();
    next.by_ip.data[0].limit = 1;
    assert_eq!(put_config(&admin, &next, "127.0.0.1").await, StatusCode::OK);

    assert_eq!(get_run(&public, "10.0.0.4").await, StatusCode::OK);
    assert_eq!(get_run(&public, "10.0.0.4").await, StatusCode::TOO_MANY_REQUESTS);

    let mut duplicate = limits();
    duplicate.by_ip.data.push(duplicate.by_ip.data[0].clone());
    assert_eq!(put_config(&admin, &duplicate, "127.0.0.1").await, StatusCode::BAD_REQUEST);

    let current = get_json(&admin, "/api/config").await;
    assert_eq!(current["by_ip"]["data"][0]["limit"], 1);
}

#[tokio::test]
async fn test_public_listener_cannot_replace_rules() {
    let mut strict = limits();
    strict.by_ip.data[0].limit = 1;
    let (public, admin) = routers(strict);

    assert_eq!(get_run(&public, "10.1.1.1").await, StatusCode::OK);
    assert_eq!(get_run(&public, "10.1.1.1").await, StatusCode::TOO_MANY_REQUESTS);

    let empty = LimitsConfig::default();
    assert_eq!(put_config(&public, &empty, "10.1.1.1").await, StatusCode::NOT_FOUND);
    for uri in ["/api/config", "/api/stats", "/api/metrics", "/api/health"] {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        assert_eq!(public.clone().oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    for _ in 0..5 {
        assert_eq!(get_run(&public, "10.1.1.1").await, StatusCode::TOO_MANY_REQUESTS);
    }
    assert_eq!(get_json(&admin, "/api/config").await["by_ip"]["data"][0]["limit"], 1);
}

#[tokio::test]
async fn test_reset_is_not_limited() {
    let (public, admin) = routers(LimitsConfig {
        title: String::new(),
        by_ip: ByIpConfig {
            exclude_ips: vec![],
            data: vec![RuleConfig {
                id: "everything".to_string(),
                handlers: vec![LimitHandlerConfig {
                    url: ".*".to_string(),
                    regexp: true,
                    ..Default::default()
                }],
                limit: 1,
                block_time: 60,
                mask: String::new(),
                exclude_ips: vec![],
            }],
        },
    });

    for _ in 0..3 {
        let (status, _) = post_reset(&public, r#"{"ip": "10.0.0.1"}"#).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(get_run(&public, "10.0.0.1").await, StatusCode::OK);
    assert_eq!(get_run(&public, "10.0.0.1").await, StatusCode::TOO_MANY_REQUESTS);

    // The admin listener has no rate limiting at all.
    for _ in 0..3 {
        get_json(&admin, "/api/health").await;
    }
}

#[tokio::test]
async fn test_encoded_path_matches_decoded_rule() {
    let mut config = limits();
    config.by_ip.data[0].handlers[0].url = "/run/a b".to_string();
    config.by_ip.data[0].limit = 1;
    let limiter = RateLimit::new(config, Arc::new(MemoryStore::new(Handle::current())));
    let public = Router::new()
        .route("/run/{*rest}", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(
            new_shared_state(limiter).unwrap(),
            throttlegate_admin::middleware::rate_limit,
        ));

    for expected in [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
        let req = Request::get("/run/a%20b")
            .header("x-forwarded-for", "10.0.0.8")
            .body(Body::empty())
            .unwrap();
        assert_eq!(public.clone().oneshot(req).await.unwrap().status(), expected);
    }
}
