//! # Testrig Probe
//!
//! HTTP probing of the dependent service and the service under test.
//!
//! A probe issues one request with a bounded timeout, checks the status code
//! against an accepted set and, when the endpoint declares required JSON
//! fields, checks that every one of them is present. Network errors,
//! timeouts and missing fields all come back as a failed `ProbeResult`;
//! nothing here returns `Err` for an unhealthy endpoint.

pub mod endpoint;
pub mod http;
pub mod suite;

pub use endpoint::{EndpointSpec, HttpMethod, RequiredField};
pub use http::{run_http_probe, HttpProber, ProbeFailure, ProbeResult};
pub use suite::{api_check_suite, benchmark_endpoint, health_endpoint};
