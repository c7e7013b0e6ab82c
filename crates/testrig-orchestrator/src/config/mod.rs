use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use testrig_common::ServiceTarget;

pub mod validation;

/// Top-level configuration for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Where reports and coverage artifacts go; relative paths are resolved
    /// against `project_root`. Defaults to `<project_root>/coverage`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,

    #[serde(default = "default_integration_dir")]
    pub integration_dir: PathBuf,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent_service: Option<DependentServiceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_under_test: Option<ServiceUnderTestConfig>,

    #[serde(default)]
    pub probes: ProbeConfig,

    #[serde(default)]
    pub load: LoadConfig,

    /// Whether a failed benchmark or load phase makes the exit code nonzero.
    /// Never affects the report's overall success.
    #[serde(default)]
    pub fail_on_non_blocking: bool,
}

/// External test runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_runner_program")]
    pub program: String,
    #[serde(default = "default_unit_timeout", with = "duration_serde")]
    pub unit_timeout: Duration,
    #[serde(default = "default_integration_timeout", with = "duration_serde")]
    pub integration_timeout: Duration,
    #[serde(default = "default_benchmark_timeout", with = "duration_serde")]
    pub benchmark_timeout: Duration,
    /// Passed through to the runner as the per-benchmark run time.
    #[serde(default = "default_benchmark_time")]
    pub benchmark_time: String,
    #[serde(default = "default_coverage_timeout", with = "duration_serde")]
    pub coverage_timeout: Duration,
    /// Extra time granted on top of the runner's own timeout before the
    /// runner process is killed.
    #[serde(default = "default_kill_margin", with = "duration_serde")]
    pub kill_margin: Duration,
    /// How much of the end of captured output is kept per phase.
    #[serde(default = "default_output_tail_bytes")]
    pub output_tail_bytes: usize,
}

/// Tools checked before anything starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_required_tools")]
    pub required_tools: Vec<String>,
    #[serde(default = "default_optional_tools")]
    pub optional_tools: Vec<String>,
}

/// Dependent external service, started before the service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependentServiceConfig {
    #[serde(default = "default_dependent_name")]
    pub name: String,
    #[serde(default = "default_dependent_program")]
    pub program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Relative paths are resolved against the artifacts directory.
    #[serde(default = "default_dependent_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_client_url")]
    pub client_url: String,
    #[serde(default = "default_peer_url")]
    pub peer_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_dependent_ready_timeout", with = "duration_serde")]
    pub ready_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_stop_grace_period", with = "duration_serde")]
    pub stop_grace_period: Duration,
}

/// How to build the service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_runner_program")]
    pub program: String,
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
    #[serde(default = "default_build_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Service under test: build, configuration file and launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUnderTestConfig {
    #[serde(default = "default_sut_name")]
    pub name: String,
    /// `None` skips the build step and runs `binary` as-is.
    #[serde(default = "default_build", skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    /// Relative paths are resolved against `project_root`.
    #[serde(default = "default_sut_binary")]
    pub binary: PathBuf,
    /// Flag preceding the configuration file path on the command line.
    #[serde(default = "default_config_flag")]
    pub config_flag: String,
    /// Relative paths are resolved against the artifacts directory.
    #[serde(default = "default_sut_config_path")]
    pub config_path: PathBuf,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_dial_timeout", with = "duration_serde")]
    pub dial_timeout: Duration,
    #[serde(default = "default_sut_ready_timeout", with = "duration_serde")]
    pub ready_timeout: Duration,
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_stop_grace_period", with = "duration_serde")]
    pub stop_grace_period: Duration,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub alerts: AlertThresholds,
}

/// Polling intervals written into the service's configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_health_check_interval", with = "duration_serde")]
    pub health_check_interval: Duration,
    #[serde(default = "default_metrics_interval", with = "duration_serde")]
    pub metrics_interval: Duration,
}

/// Alert thresholds written into the service's configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    #[serde(default = "default_max_database_size_mb")]
    pub max_database_size_mb: u64,
    #[serde(default = "default_min_available_nodes")]
    pub min_available_nodes: u32,
    #[serde(default = "default_max_leader_changes_per_hour")]
    pub max_leader_changes_per_hour: u32,
}

/// HTTP probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_benchmark_operations")]
    pub benchmark_operations: u64,
}

/// Load phase settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_total_requests")]
    pub total_requests: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_health_path")]
    pub path: String,
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: OrchestratorConfig = serde_yaml::from_str(content)
            .context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        match &self.artifacts_dir {
            Some(dir) => self.project_root.join(dir),
            None => self.project_root.join("coverage"),
        }
    }

    pub fn integration_path(&self) -> PathBuf {
        self.project_root.join(&self.integration_dir)
    }

    pub fn coverage_profile(&self) -> PathBuf {
        self.artifacts_dir().join("coverage.out")
    }

    pub fn coverage_html(&self) -> PathBuf {
        self.artifacts_dir().join("coverage.html")
    }

    pub fn coverage_summary_file(&self) -> PathBuf {
        self.artifacts_dir().join("coverage-summary.txt")
    }

    pub fn benchmark_output_file(&self) -> PathBuf {
        self.artifacts_dir().join("benchmarks.txt")
    }

    pub fn dependent_data_dir(&self) -> Option<PathBuf> {
        self.dependent_service
            .as_ref()
            .map(|d| self.artifacts_dir().join(&d.data_dir))
    }

    pub fn service_config_path(&self) -> Option<PathBuf> {
        self.service_under_test
            .as_ref()
            .map(|s| self.artifacts_dir().join(&s.config_path))
    }

    pub fn service_binary(&self) -> Option<PathBuf> {
        self.service_under_test
            .as_ref()
            .map(|s| self.project_root.join(&s.binary))
    }

    /// Connection target for probes against the service under test.
    pub fn service_target(&self) -> Option<ServiceTarget> {
        self.service_under_test.as_ref().map(|s| s.target())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            artifacts_dir: None,
            integration_dir: default_integration_dir(),
            runner: RunnerConfig::default(),
            environment: EnvironmentConfig::default(),
            dependent_service: None,
            service_under_test: None,
            probes: ProbeConfig::default(),
            load: LoadConfig::default(),
            fail_on_non_blocking: false,
        }
    }
}

impl ServiceUnderTestConfig {
    /// A wildcard bind address is probed over loopback.
    pub fn target(&self) -> ServiceTarget {
        let host = match self.api_host.as_str() {
            "0.0.0.0" | "" => "127.0.0.1",
            "::" => "::1",
            other => other,
        };
        ServiceTarget::new(host, self.api_port)
    }
}

impl DependentServiceConfig {
    /// `http://127.0.0.1:2379` -> `127.0.0.1:2379`
    pub fn client_endpoint(&self) -> String {
        self.client_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.client_url)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn health_url(&self) -> String {
        format!(
            "{}/{}",
            self.client_url.trim_end_matches('/'),
            self.health_path.trim_start_matches('/')
        )
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            unit_timeout: default_unit_timeout(),
            integration_timeout: default_integration_timeout(),
            benchmark_timeout: default_benchmark_timeout(),
            benchmark_time: default_benchmark_time(),
            coverage_timeout: default_coverage_timeout(),
            kill_margin: default_kill_margin(),
            output_tail_bytes: default_output_tail_bytes(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            required_tools: default_required_tools(),
            optional_tools: default_optional_tools(),
        }
    }
}

impl Default for DependentServiceConfig {
    fn default() -> Self {
        Self {
            name: default_dependent_name(),
            program: default_dependent_program(),
            extra_args: Vec::new(),
            data_dir: default_dependent_data_dir(),
            client_url: default_client_url(),
            peer_url: default_peer_url(),
            health_path: default_health_path(),
            ready_timeout: default_dependent_ready_timeout(),
            poll_interval: default_poll_interval(),
            stop_grace_period: default_stop_grace_period(),
        }
    }
}

impl Default for ServiceUnderTestConfig {
    fn default() -> Self {
        Self {
            name: default_sut_name(),
            build: default_build(),
            binary: default_sut_binary(),
            config_flag: default_config_flag(),
            config_path: default_sut_config_path(),
            extra_args: Vec::new(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            dial_timeout: default_dial_timeout(),
            ready_timeout: default_sut_ready_timeout(),
            poll_interval: default_poll_interval(),
            stop_grace_period: default_stop_grace_period(),
            monitor: MonitorSettings::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            health_check_interval: default_health_check_interval(),
            metrics_interval: default_metrics_interval(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_latency_ms: default_max_latency_ms(),
            max_database_size_mb: default_max_database_size_mb(),
            min_available_nodes: default_min_available_nodes(),
            max_leader_changes_per_hour: default_max_leader_changes_per_hour(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            benchmark_operations: default_benchmark_operations(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_requests: default_total_requests(),
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            success_threshold: default_success_threshold(),
            path: default_health_path(),
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_integration_dir() -> PathBuf {
    PathBuf::from("integration_tests")
}

fn default_runner_program() -> String {
    "go".to_string()
}

fn default_unit_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_integration_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_benchmark_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_benchmark_time() -> String {
    "5s".to_string()
}

fn default_coverage_timeout() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_kill_margin() -> Duration {
    Duration::from_secs(60)
}

fn default_output_tail_bytes() -> usize {
    64 * 1024
}

fn default_required_tools() -> Vec<String> {
    vec!["go".to_string()]
}

fn default_optional_tools() -> Vec<String> {
    vec!["git".to_string(), "golangci-lint".to_string()]
}

fn default_dependent_name() -> String {
    "etcd".to_string()
}

fn default_dependent_program() -> String {
    "etcd".to_string()
}

fn default_dependent_data_dir() -> PathBuf {
    PathBuf::from("etcd-data")
}

fn default_client_url() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_peer_url() -> String {
    "http://127.0.0.1:2380".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_dependent_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sut_ready_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_stop_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_sut_name() -> String {
    "etcd-monitor".to_string()
}

fn default_build() -> Option<BuildConfig> {
    Some(BuildConfig::default())
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            args: default_build_args(),
            timeout: default_build_timeout(),
        }
    }
}

fn default_build_args() -> Vec<String> {
    ["build", "-o", "bin/etcd-monitor", "./cmd/etcd-monitor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sut_binary() -> PathBuf {
    PathBuf::from("bin/etcd-monitor")
}

fn default_config_flag() -> String {
    "--config".to_string()
}

fn default_sut_config_path() -> PathBuf {
    PathBuf::from("etcd-monitor-test.yaml")
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_metrics_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_latency_ms() -> u64 {
    100
}

fn default_max_database_size_mb() -> u64 {
    8192
}

fn default_min_available_nodes() -> u32 {
    2
}

fn default_max_leader_changes_per_hour() -> u32 {
    3
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_benchmark_operations() -> u64 {
    100
}

fn default_total_requests() -> u32 {
    100
}

fn default_concurrency() -> usize {
    20
}

fn default_success_threshold() -> f64 {
    testrig_load::DEFAULT_SUCCESS_THRESHOLD
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn format_duration(duration: Duration) -> String {
        if duration.subsec_millis() != 0 {
            format!("{}ms", duration.as_millis())
        } else if duration.as_secs() != 0 && duration.as_secs() % 60 == 0 {
            format!("{}m", duration.as_secs() / 60)
        } else {
            format!("{}s", duration.as_secs())
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = OrchestratorConfig::load_from_string("{}").unwrap();
        assert_eq!(config.runner.program, "go");
        assert_eq!(config.runner.unit_timeout, Duration::from_secs(600));
        assert_eq!(config.runner.integration_timeout, Duration::from_secs(1800));
        assert_eq!(config.load.total_requests, 100);
        assert_eq!(config.load.concurrency, 20);
        assert_eq!(config.load.success_threshold, 0.95);
        assert!(!config.fail_on_non_blocking);
        assert!(config.dependent_service.is_none());
        assert_eq!(config.artifacts_dir(), PathBuf::from("./coverage"));
        assert_eq!(config.coverage_profile(), PathBuf::from("./coverage/coverage.out"));
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
project_root: /work/monitor
artifacts_dir: out
fail_on_non_blocking: true
runner:
  unit_timeout: 2m
  benchmark_time: 1s
dependent_service:
  client_url: http://127.0.0.1:23790
  ready_timeout: 10s
  poll_interval: 250ms
service_under_test:
  build: ~
  binary: /usr/local/bin/etcd-monitor
  api_port: 18080
  alerts:
    max_latency_ms: 50
load:
  total_requests: 500
  concurrency: 50
  success_threshold: 0.99
"#;
        let config = OrchestratorConfig::load_from_string(yaml).unwrap();
        assert!(config.fail_on_non_blocking);
        assert_eq!(config.artifacts_dir(), PathBuf::from("/work/monitor/out"));
        assert_eq!(config.runner.unit_timeout, Duration::from_secs(120));
        assert_eq!(config.runner.benchmark_time, "1s");

        let dep = config.dependent_service.as_ref().unwrap();
        assert_eq!(dep.poll_interval, Duration::from_millis(250));
        assert_eq!(dep.client_endpoint(), "127.0.0.1:23790");
        assert_eq!(dep.health_url(), "http://127.0.0.1:23790/health");
        assert_eq!(
            config.dependent_data_dir(),
            Some(PathBuf::from("/work/monitor/out/etcd-data"))
        );

        let sut = config.service_under_test.as_ref().unwrap();
        assert!(sut.build.is_none());
        assert_eq!(sut.alerts.max_latency_ms, 50);
        assert_eq!(sut.alerts.min_available_nodes, 2);
        assert_eq!(
            config.service_binary(),
            Some(PathBuf::from("/usr/local/bin/etcd-monitor"))
        );
        assert_eq!(config.service_target(), Some(ServiceTarget::new("127.0.0.1", 18080)));
        assert_eq!(config.load.concurrency, 50);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = OrchestratorConfig::load_from_string("runner:\n  unit_timeout: 10h\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Duration must end with"));
    }

    #[test]
    fn test_duration_format_round_trip() {
        use duration_serde::{format_duration, parse_duration};
        for d in [
            Duration::from_millis(250),
            Duration::from_secs(5),
            Duration::from_secs(600),
            Duration::from_secs(90),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = OrchestratorConfig::load_from_file("/nonexistent/testrig.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
