use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::time::Duration;
use testrig_common::ServiceTarget;
use testrig_probe::{
    api_check_suite, benchmark_endpoint, health_endpoint, run_http_probe, EndpointSpec,
    HttpProber, ProbeFailure,
};

async fn spawn_fixture(app: Router) -> ServiceTarget {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ServiceTarget::new("127.0.0.1", port)
}

fn healthy_api() -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
        .route(
            "/api/v1/cluster/status",
            get(|| async { Json(json!({"healthy": true, "member_count": 3, "quorum_size": 2})) }),
        )
        .route("/api/v1/cluster/members", get(|| async { Json(json!([])) }))
        .route("/api/v1/cluster/leader", get(|| async { Json(json!({"leader": "a"})) }))
        .route("/api/v1/metrics/current", get(|| async { Json(json!({})) }))
        .route("/api/v1/metrics/latency", get(|| async { Json(json!({})) }))
        .route("/api/v1/alerts", get(|| async { Json(json!([])) }))
        .route("/api/v1/alerts/history", get(|| async { Json(json!([])) }))
        .route(
            "/api/v1/performance/benchmark",
            post(|Json(body): Json<Value>| async move {
                (StatusCode::NOT_IMPLEMENTED, Json(json!({"requested": body["operations"]})))
            }),
        )
}

#[tokio::test]
async fn test_full_suite_passes_against_healthy_api() {
    let target = spawn_fixture(healthy_api()).await;
    let prober = HttpProber::new();

    for spec in api_check_suite() {
        let result = prober.probe(&target, &spec).await;
        assert!(result.is_success(), "{} failed: {:?}", spec.name, result.failure);
        assert_eq!(result.status, Some(200));
    }

    let bench = prober.probe(&target, &benchmark_endpoint(50)).await;
    assert!(bench.is_success());
    assert_eq!(bench.status, Some(501));
}

#[tokio::test]
async fn test_unhealthy_status_field_fails() {
    let app = Router::new().route("/health", get(|| async { Json(json!({"status": "degraded"})) }));
    let target = spawn_fixture(app).await;

    let result = HttpProber::new().probe(&target, &health_endpoint()).await;
    assert!(!result.is_success());
    assert_eq!(result.status, Some(200));
    assert!(matches!(result.failure, Some(ProbeFailure::FieldMismatch { .. })));
    assert!(!run_http_probe(&target, &health_endpoint()).await);
}

#[tokio::test]
async fn test_server_error_status_fails() {
    let app = Router::new().route(
        "/api/v1/alerts",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let target = spawn_fixture(app).await;

    let spec = EndpointSpec::get("alerts", "/api/v1/alerts");
    let result = HttpProber::new().probe(&target, &spec).await;
    assert_eq!(result.failure, Some(ProbeFailure::UnexpectedStatus(500)));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let app = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"status": "healthy"}))
        }),
    );
    let target = spawn_fixture(app).await;

    let spec = health_endpoint().with_timeout(Duration::from_millis(200));
    let result = HttpProber::new().probe(&target, &spec).await;
    assert_eq!(
        result.failure,
        Some(ProbeFailure::Timeout(Duration::from_millis(200)))
    );
    assert!(result.latency < Duration::from_secs(2));
}

#[tokio::test]
async fn test_probe_url_ignores_spec_path() {
    let target = spawn_fixture(healthy_api()).await;
    let result = HttpProber::new()
        .probe_url(&target.url("/health"), &EndpointSpec::get("dep", "/unused"))
        .await;
    assert!(result.is_success());
}
