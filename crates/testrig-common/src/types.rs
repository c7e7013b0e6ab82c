//! Core value types shared by the phase runner, the parsers and the report.
//!
//! Every record here is created once and then only read. Fields are private
//! and exposed through accessors so a `PhaseOutcome` cannot be edited after
//! the phase that produced it has finished.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identity of a test phase.
///
/// The declaration order is the fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Unit,
    Integration,
    Benchmark,
    Load,
}

impl PhaseName {
    /// All phases in execution order.
    pub const ALL: [PhaseName; 4] = [
        PhaseName::Unit,
        PhaseName::Integration,
        PhaseName::Benchmark,
        PhaseName::Load,
    ];

    /// Blocking phases flip overall success when they fail.
    pub fn is_blocking(&self) -> bool {
        matches!(self, PhaseName::Unit | PhaseName::Integration)
    }

    /// Whether the phase needs the service under test to be ready.
    pub fn requires_service(&self) -> bool {
        !matches!(self, PhaseName::Unit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Unit => "unit",
            PhaseName::Integration => "integration",
            PhaseName::Benchmark => "benchmark",
            PhaseName::Load => "load",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of one phase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Passed => write!(f, "passed"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Immutable result record for one test phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    name: PhaseName,
    status: PhaseStatus,
    blocking: bool,
    #[serde(with = "duration_secs")]
    duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    diagnostics: String,
}

impl PhaseOutcome {
    fn new(name: PhaseName, status: PhaseStatus, duration: Duration, detail: String) -> Self {
        Self {
            name,
            status,
            blocking: name.is_blocking(),
            duration,
            exit_code: None,
            detail,
            diagnostics: String::new(),
        }
    }

    pub fn passed(name: PhaseName, duration: Duration, detail: impl Into<String>) -> Self {
        Self::new(name, PhaseStatus::Passed, duration, detail.into())
    }

    pub fn failed(name: PhaseName, duration: Duration, detail: impl Into<String>) -> Self {
        Self::new(name, PhaseStatus::Failed, duration, detail.into())
    }

    pub fn skipped(name: PhaseName, reason: impl Into<String>) -> Self {
        Self::new(name, PhaseStatus::Skipped, Duration::ZERO, reason.into())
    }

    /// Records the runner's exit code.
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Attaches captured output or other free-form diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }

    pub fn name(&self) -> PhaseName {
        self.name
    }

    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    pub fn is_failed(&self) -> bool {
        self.status == PhaseStatus::Failed
    }
}

/// Aggregate coverage plus a per-unit breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    overall_percent: f64,
    per_unit: BTreeMap<String, f64>,
}

impl CoverageSummary {
    /// Returns `None` when `overall_percent` is not a percentage in `[0, 100]`.
    pub fn new(overall_percent: f64) -> Option<Self> {
        is_percentage(overall_percent).then(|| Self {
            overall_percent,
            per_unit: BTreeMap::new(),
        })
    }

    /// Adds a unit entry. Returns `false` (leaving the map untouched) for a
    /// duplicate key or an out-of-range percentage.
    pub fn insert_unit(&mut self, unit: impl Into<String>, percent: f64) -> bool {
        if !is_percentage(percent) {
            return false;
        }
        match self.per_unit.entry(unit.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(percent);
                true
            }
        }
    }

    pub fn overall_percent(&self) -> f64 {
        self.overall_percent
    }

    pub fn per_unit(&self) -> &BTreeMap<String, f64> {
        &self.per_unit
    }
}

fn is_percentage(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}

/// One benchmark result.
///
/// `p95_latency_ms`/`p99_latency_ms` are `None` when the source did not
/// report them; `None` is never collapsed to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    pub ops_per_sec: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_per_op: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocs_per_op: Option<u64>,
}

impl BenchmarkRecord {
    /// Derives throughput and mean latency from a per-operation cost in
    /// nanoseconds. Returns `None` for a non-positive or non-finite cost.
    pub fn from_ns_per_op(name: impl Into<String>, ns_per_op: f64) -> Option<Self> {
        if !ns_per_op.is_finite() || ns_per_op <= 0.0 {
            return None;
        }
        Some(Self {
            name: name.into(),
            iterations: None,
            ops_per_sec: 1e9 / ns_per_op,
            avg_latency_ms: ns_per_op / 1e6,
            p95_latency_ms: None,
            p99_latency_ms: None,
            error_rate: 0.0,
            bytes_per_op: None,
            allocs_per_op: None,
        })
    }
}

/// Read-only connection target handed to probes and the load generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub host: String,
    pub port: u16,
}

impl ServiceTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Joins `path` onto the base URL, inserting the leading slash if missing.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Serializes a `Duration` as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
