// HTTP probe implementation

use crate::endpoint::EndpointSpec;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::time::{Duration, Instant};
use testrig_common::ServiceTarget;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Why a probe did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("Response body is not a JSON object: {0}")]
    InvalidBody(String),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' is {actual}, expected {expected}")]
    FieldMismatch {
        field: String,
        expected: Value,
        actual: Value,
    },
}

/// Outcome of a single probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub endpoint: String,
    pub status: Option<u16>,
    pub latency: Duration,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(endpoint: &str, status: Option<u16>, latency: Duration, failure: ProbeFailure) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            status,
            latency,
            failure: Some(failure),
        }
    }
}

/// Reusable HTTP prober.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpProber {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Probe `spec.path` on `target`.
    pub async fn probe(&self, target: &ServiceTarget, spec: &EndpointSpec) -> ProbeResult {
        self.probe_url(&target.url(&spec.path), spec).await
    }

    /// Probe an absolute URL, using everything in `spec` except its path.
    pub async fn probe_url(&self, url: &str, spec: &EndpointSpec) -> ProbeResult {
        let start_time = Instant::now();
        debug!("Starting HTTP probe: {} {}", spec.method.as_hyper(), url);

        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return ProbeResult::failed(
                    url,
                    None,
                    start_time.elapsed(),
                    ProbeFailure::InvalidRequest(format!("Invalid URI: {}", e)),
                )
            }
        };

        let mut builder = Request::builder()
            .method(spec.method.as_hyper())
            .uri(uri)
            .header("User-Agent", "testrig/0.1");
        let body = match &spec.body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Full::new(Bytes::from(json.to_string()))
            }
            None => Full::new(Bytes::new()),
        };
        let request = match builder.body(body) {
            Ok(request) => request,
            Err(e) => {
                return ProbeResult::failed(
                    url,
                    None,
                    start_time.elapsed(),
                    ProbeFailure::InvalidRequest(format!("Failed to build request: {}", e)),
                )
            }
        };

        // The timeout covers both the response head and the body.
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ProbeFailure::Connection(e.to_string()))?;
            let status = response.status().as_u16();
            if !spec.accepts(status) || spec.required_fields.is_empty() {
                return Ok((status, None));
            }
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ProbeFailure::Connection(format!("Failed to read body: {}", e)))?
                .to_bytes();
            Ok::<_, ProbeFailure>((status, Some(body)))
        };

        let (status, body) = match timeout(spec.timeout, exchange).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(failure)) => {
                warn!("HTTP probe failed: {} - {}", url, failure);
                return ProbeResult::failed(url, None, start_time.elapsed(), failure);
            }
            Err(_) => {
                warn!("HTTP probe timeout: {}", url);
                return ProbeResult::failed(
                    url,
                    None,
                    start_time.elapsed(),
                    ProbeFailure::Timeout(spec.timeout),
                );
            }
        };
        let latency = start_time.elapsed();

        if !spec.accepts(status) {
            debug!("HTTP probe rejected status: {} - {}", url, status);
            return ProbeResult::failed(url, Some(status), latency, ProbeFailure::UnexpectedStatus(status));
        }

        if let Some(body) = body {
            if let Err(failure) = check_required_fields(spec, &body) {
                debug!("HTTP probe body check failed: {} - {}", url, failure);
                return ProbeResult::failed(url, Some(status), latency, failure);
            }
        }

        debug!(
            "HTTP probe complete: {} - status={} time={}ms",
            url,
            status,
            latency.as_millis()
        );
        ProbeResult {
            endpoint: url.to_string(),
            status: Some(status),
            latency,
            failure: None,
        }
    }
}

fn check_required_fields(spec: &EndpointSpec, body: &[u8]) -> Result<(), ProbeFailure> {
    let json: Value =
        serde_json::from_slice(body).map_err(|e| ProbeFailure::InvalidBody(e.to_string()))?;
    let object = json
        .as_object()
        .ok_or_else(|| ProbeFailure::InvalidBody(format!("got {}", json)))?;

    for field in &spec.required_fields {
        let actual = object
            .get(&field.name)
            .ok_or_else(|| ProbeFailure::MissingField(field.name.clone()))?;
        if let Some(expected) = &field.equals {
            if actual != expected {
                return Err(ProbeFailure::FieldMismatch {
                    field: field.name.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
    }
    Ok(())
}

/// One-shot probe with a fresh client.
pub async fn run_http_probe(target: &ServiceTarget, spec: &EndpointSpec) -> bool {
    HttpProber::new().probe(target, spec).await.is_success()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_fields_checked() {
        let spec = EndpointSpec::get("health", "/health")
            .require_field_eq("status", json!("healthy"))
            .require_field("uptime");

        assert!(check_required_fields(&spec, br#"{"status":"healthy","uptime":3}"#).is_ok());
        assert_eq!(
            check_required_fields(&spec, br#"{"status":"healthy"}"#),
            Err(ProbeFailure::MissingField("uptime".to_string()))
        );
        assert!(matches!(
            check_required_fields(&spec, br#"{"status":"degraded","uptime":3}"#),
            Err(ProbeFailure::FieldMismatch { .. })
        ));
        assert!(matches!(
            check_required_fields(&spec, b"[1,2]"),
            Err(ProbeFailure::InvalidBody(_))
        ));
        assert!(matches!(
            check_required_fields(&spec, b"not json"),
            Err(ProbeFailure::InvalidBody(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_is_failed_probe() {
        let result = HttpProber::new()
            .probe_url("not a url", &EndpointSpec::get("x", "/"))
            .await;
        assert!(!result.is_success());
        assert!(matches!(result.failure, Some(ProbeFailure::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_failed_probe() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ServiceTarget::new("127.0.0.1", port);
        let spec = EndpointSpec::get("health", "/health").with_timeout(Duration::from_secs(2));
        let result = HttpProber::new().probe(&target, &spec).await;
        assert!(!result.is_success());
        assert!(result.status.is_none());
    }
}
