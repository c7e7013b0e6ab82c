//! Endpoint specifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// HTTP methods supported by probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Head,
}

impl HttpMethod {
    pub fn as_hyper(&self) -> hyper::Method {
        match self {
            HttpMethod::Get => hyper::Method::GET,
            HttpMethod::Post => hyper::Method::POST,
            HttpMethod::Head => hyper::Method::HEAD,
        }
    }
}

/// A top-level JSON field that must be present, optionally with a fixed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
}

/// What to request and what counts as a healthy answer.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSpec {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    pub accepted_status: Vec<u16>,
    pub required_fields: Vec<RequiredField>,
    pub timeout: Duration,
}

impl EndpointSpec {
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            accepted_status: vec![200],
            required_fields: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn post_json(name: impl Into<String>, path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(name, path)
        }
    }

    pub fn with_accepted_status(mut self, status_codes: Vec<u16>) -> Self {
        self.accepted_status = status_codes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn require_field(mut self, name: impl Into<String>) -> Self {
        self.required_fields.push(RequiredField {
            name: name.into(),
            equals: None,
        });
        self
    }

    pub fn require_field_eq(mut self, name: impl Into<String>, value: Value) -> Self {
        self.required_fields.push(RequiredField {
            name: name.into(),
            equals: Some(value),
        });
        self
    }

    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_status.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_builder() {
        let spec = EndpointSpec::post_json("bench", "/api/v1/performance/benchmark", json!({"operations": 10}))
            .with_accepted_status(vec![200, 501])
            .with_timeout(Duration::from_secs(10))
            .require_field("ops");

        assert_eq!(spec.method, HttpMethod::Post);
        assert!(spec.accepts(501));
        assert!(!spec.accepts(500));
        assert_eq!(spec.timeout, Duration::from_secs(10));
        assert_eq!(spec.required_fields.len(), 1);
        assert_eq!(spec.body, Some(json!({"operations": 10})));
    }
}
