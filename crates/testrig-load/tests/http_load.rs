use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testrig_common::ServiceTarget;
use testrig_load::{HttpRequestProbe, LoadGenerator, DEFAULT_SUCCESS_THRESHOLD};
use testrig_probe::EndpointSpec;

async fn spawn_fixture(app: Router) -> ServiceTarget {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ServiceTarget::new("127.0.0.1", port)
}

#[tokio::test]
async fn test_always_healthy_endpoint_full_ratio() {
    let app = Router::new().route("/health", get(|| async { "ok" }));
    let target = spawn_fixture(app).await;

    let probe = Arc::new(HttpRequestProbe::new(
        target,
        EndpointSpec::get("health", "/health"),
    ));
    let summary = LoadGenerator::new(20, Duration::from_secs(5))
        .run(probe, 100)
        .await;

    assert_eq!(summary.succeeded, 100);
    assert_eq!(summary.success_ratio, 1.0);
    assert!(summary.latency.is_some());
    assert!(!summary.judge(DEFAULT_SUCCESS_THRESHOLD).is_failed());
}

#[tokio::test]
async fn test_every_third_request_failing() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/health",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }
        }),
    );
    let target = spawn_fixture(app).await;

    let probe = Arc::new(HttpRequestProbe::new(
        target,
        EndpointSpec::get("health", "/health"),
    ));
    let summary = LoadGenerator::new(20, Duration::from_secs(5))
        .run(probe, 100)
        .await;

    assert_eq!(summary.failed, 33);
    assert!((summary.success_ratio - 0.67).abs() < 1e-9);

    let outcome = summary.judge(DEFAULT_SUCCESS_THRESHOLD);
    assert!(outcome.is_failed());
    assert!(!outcome.is_blocking());
}
