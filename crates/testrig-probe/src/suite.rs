//! Built-in endpoint sets for the service under test.

use crate::endpoint::EndpointSpec;
use serde_json::json;

/// Readiness endpoint: `GET /health` answering `{"status": "healthy"}`.
pub fn health_endpoint() -> EndpointSpec {
    EndpointSpec::get("health", "/health").require_field_eq("status", json!("healthy"))
}

/// Benchmark trigger. Services built without benchmark support answer 501.
pub fn benchmark_endpoint(operations: u64) -> EndpointSpec {
    EndpointSpec::post_json(
        "performance_benchmark",
        "/api/v1/performance/benchmark",
        json!({ "operations": operations }),
    )
    .with_accepted_status(vec![200, 501])
}

/// API checks run during the integration phase.
pub fn api_check_suite() -> Vec<EndpointSpec> {
    vec![
        health_endpoint(),
        EndpointSpec::get("cluster_status", "/api/v1/cluster/status")
            .require_field("healthy")
            .require_field("member_count")
            .require_field("quorum_size"),
        EndpointSpec::get("cluster_members", "/api/v1/cluster/members"),
        EndpointSpec::get("cluster_leader", "/api/v1/cluster/leader"),
        EndpointSpec::get("metrics_current", "/api/v1/metrics/current"),
        EndpointSpec::get("metrics_latency", "/api/v1/metrics/latency"),
        EndpointSpec::get("alerts", "/api/v1/alerts"),
        EndpointSpec::get("alerts_history", "/api/v1/alerts/history"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_paths_unique() {
        let suite = api_check_suite();
        let mut paths: Vec<_> = suite.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), suite.len());
        assert_eq!(suite[0].path, "/health");
    }

    #[test]
    fn test_benchmark_endpoint_accepts_not_implemented() {
        let spec = benchmark_endpoint(100);
        assert!(spec.accepts(200));
        assert!(spec.accepts(501));
        assert_eq!(spec.body, Some(json!({"operations": 100})));
    }
}
