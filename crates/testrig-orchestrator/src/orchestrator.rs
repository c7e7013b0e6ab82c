//! TestOrchestrator - drives one run from setup to cleanup.

use crate::config::{DependentServiceConfig, OrchestratorConfig, ServiceUnderTestConfig};
use crate::environment::validate_environment;
use crate::options::RunOptions;
use crate::runner::PhaseRunner;
use crate::service_config::ServiceConfigDocument;
use crate::state::{OrchestratorState, StateMachine};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use testrig_common::{Error, PhaseName, PhaseOutcome, Result, ServiceTarget};
use testrig_probe::{health_endpoint, EndpointSpec, HttpProber};
use testrig_process::ToolRunner;
use testrig_report::{Report, ReportAggregator};
use testrig_supervisor::{CommandSpec, ProcessSupervisor, Readiness};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Everything a caller needs after a run: the report (when one was
/// produced), the path it was published to, and the process exit code.
#[derive(Debug)]
pub struct RunSummary {
    pub states: Vec<OrchestratorState>,
    pub report: Option<Report>,
    pub report_path: Option<PathBuf>,
    pub setup_error: Option<String>,
    pub publish_error: Option<String>,
    pub interrupted: bool,
    pub cleanup_errors: Vec<String>,
    pub exit_code: i32,
}

impl RunSummary {
    pub fn final_state(&self) -> OrchestratorState {
        self.states
            .last()
            .copied()
            .unwrap_or(OrchestratorState::Idle)
    }

    pub fn overall_success(&self) -> bool {
        matches!(self.final_state(), OrchestratorState::Done(true))
    }
}

enum Flow {
    /// Phases and coverage are done; the report is still to be published.
    Gathered,
    SetupFailed(Error),
}

struct Published {
    report: Report,
    report_path: Option<PathBuf>,
    publish_error: Option<String>,
}

pub struct TestOrchestrator {
    config: OrchestratorConfig,
    options: RunOptions,
    tools: Arc<dyn ToolRunner>,
    runner: PhaseRunner,
    state: StateMachine,
    dependent: ProcessSupervisor,
    service: ProcessSupervisor,
    aggregator: ReportAggregator,
    /// Set only when this run created the dependent's data directory.
    created_data_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl TestOrchestrator {
    pub fn new(mut config: OrchestratorConfig, options: RunOptions, tools: Arc<dyn ToolRunner>) -> Self {
        // Child processes run with other working directories.
        if config.project_root.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                config.project_root = cwd.join(&config.project_root);
            }
        }
        let runner = PhaseRunner::new(Arc::clone(&tools), config.clone(), options.clone());
        let dependent_name = config
            .dependent_service
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| "dependent-service".to_string());
        let service_name = config
            .service_under_test
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "service-under-test".to_string());

        Self {
            config,
            options,
            tools,
            runner,
            state: StateMachine::new(),
            dependent: ProcessSupervisor::new(dependent_name),
            service: ProcessSupervisor::new(service_name),
            aggregator: ReportAggregator::new(),
            created_data_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that interrupts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.current_state()
    }

    /// Run setup, the selected phases and aggregation, then clean up.
    ///
    /// Cleanup always runs exactly once, whether the run completed, setup
    /// failed or the cancellation token fired. Once aggregation has gathered
    /// everything, publishing is no longer interruptible.
    pub async fn run(mut self) -> RunSummary {
        let started_at = Utc::now();
        let cancel = self.cancel.clone();

        let flow = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            flow = self.execute() => Some(flow),
        };

        let published = match &flow {
            Some(Flow::Gathered) => Some(self.publish(started_at).await),
            _ => None,
        };

        let reason = match &flow {
            None => {
                warn!("Run interrupted in state {}", self.state());
                Some("interrupted".to_string())
            }
            Some(Flow::SetupFailed(e)) => {
                error!("Setup failed: {}", e);
                Some(format!("setup failed: {}", e))
            }
            Some(Flow::Gathered) => None,
        };
        self.transition(OrchestratorState::CleaningUp, reason);
        let cleanup_errors = self.cleanup().await;

        let mut summary = RunSummary {
            states: Vec::new(),
            report: None,
            report_path: None,
            setup_error: None,
            publish_error: None,
            interrupted: flow.is_none(),
            cleanup_errors,
            exit_code: EXIT_FAILURE,
        };

        let success = match (flow, published) {
            (Some(Flow::SetupFailed(e)), _) => {
                summary.setup_error = Some(e.to_string());
                false
            }
            (
                Some(Flow::Gathered),
                Some(Published {
                    report,
                    report_path,
                    publish_error,
                }),
            ) => {
                let success = report.overall_success();
                let non_blocking_veto =
                    self.config.fail_on_non_blocking && report.has_non_blocking_failures();
                if success && !non_blocking_veto && publish_error.is_none() {
                    summary.exit_code = EXIT_SUCCESS;
                }
                summary.report = Some(report);
                summary.report_path = report_path;
                summary.publish_error = publish_error;
                success
            }
            _ => {
                summary.exit_code = EXIT_INTERRUPTED;
                false
            }
        };

        self.transition(OrchestratorState::Done(success), None);
        summary.states = self.state.visited();
        summary
    }

    fn transition(&mut self, target: OrchestratorState, reason: Option<String>) {
        if let Err(e) = self.state.transition_to(target, reason) {
            error!("{}", e);
        }
    }

    async fn execute(&mut self) -> Flow {
        self.transition(OrchestratorState::SettingUp, None);
        if let Err(e) = self.setup().await {
            return Flow::SetupFailed(e);
        }

        let target = if self.options.selection.needs_service() {
            self.config.service_target()
        } else {
            None
        };

        for phase in self.options.selection.phases() {
            self.transition(OrchestratorState::RunningPhase(phase), None);
            let outcome = self.run_phase(phase, target.as_ref()).await;
            info!(
                "Phase {} finished: {} ({})",
                phase,
                outcome.status(),
                outcome.detail()
            );
            self.aggregator.record_phase(outcome);
        }

        self.transition(OrchestratorState::Aggregating, None);
        if self.options.selection.coverage {
            let coverage = self.runner.generate_coverage().await;
            self.aggregator
                .set_coverage(coverage.parse.into_summary(), coverage.html);
        }

        Flow::Gathered
    }

    async fn publish(&mut self, started_at: DateTime<Utc>) -> Published {
        let aggregator = std::mem::take(&mut self.aggregator);
        let report = aggregator.finalize(started_at, Utc::now());
        let (report_path, publish_error) = match report.publish(self.config.artifacts_dir()).await {
            Ok(path) => (Some(path), None),
            Err(e) => {
                error!("Failed to publish report: {}", e);
                (None, Some(e.to_string()))
            }
        };

        Published {
            report,
            report_path,
            publish_error,
        }
    }

    async fn run_phase(&mut self, phase: PhaseName, target: Option<&ServiceTarget>) -> PhaseOutcome {
        match phase {
            PhaseName::Unit => self.runner.run_unit().await,
            PhaseName::Integration => {
                if self.aggregator.has_blocking_failure() {
                    PhaseOutcome::skipped(phase, "halted after an earlier blocking phase failed")
                } else {
                    self.runner.run_integration(target).await
                }
            }
            PhaseName::Benchmark => {
                let (outcome, records) = self.runner.run_benchmark(target).await;
                self.aggregator.extend_benchmarks(records);
                outcome
            }
            PhaseName::Load => match target {
                Some(target) => {
                    let (outcome, summary) = self.runner.run_load(target).await;
                    self.aggregator.set_load(summary);
                    outcome
                }
                None => PhaseOutcome::skipped(phase, "no service under test configured"),
            },
        }
    }

    async fn setup(&mut self) -> Result<()> {
        let artifacts = self.config.artifacts_dir();
        tokio::fs::create_dir_all(&artifacts).await.map_err(|e| {
            Error::setup(
                "artifacts",
                format!("cannot create {}: {}", artifacts.display(), e),
            )
        })?;

        validate_environment(
            &self.config.environment,
            &self.config.runner.program,
            self.tools.as_ref(),
        )
        .await?;

        if !self.options.selection.needs_service() {
            info!("No selected phase needs running services");
            return Ok(());
        }

        if let Some(dependent) = self.config.dependent_service.clone() {
            self.start_dependent(&dependent).await?;
        }
        if let Some(service) = self.config.service_under_test.clone() {
            self.start_service(&service).await?;
        }
        Ok(())
    }

    async fn start_dependent(&mut self, dependent: &DependentServiceConfig) -> Result<()> {
        let data_dir = self
            .config
            .dependent_data_dir()
            .ok_or_else(|| Error::Internal("dependent service not configured".to_string()))?;
        if tokio::fs::try_exists(&data_dir).await? {
            info!("Using existing data directory {}", data_dir.display());
        } else {
            tokio::fs::create_dir_all(&data_dir).await?;
            self.created_data_dir = Some(data_dir.clone());
        }

        let spec = CommandSpec::new(&dependent.program)
            .args(["--data-dir".to_string(), data_dir.display().to_string()])
            .args(["--listen-client-urls", dependent.client_url.as_str()])
            .args(["--advertise-client-urls", dependent.client_url.as_str()])
            .args(["--listen-peer-urls", dependent.peer_url.as_str()])
            .args(dependent.extra_args.iter().cloned())
            .working_dir(self.config.artifacts_dir())
            .log_file(self.config.artifacts_dir().join(format!("{}.log", dependent.name)));
        self.dependent.start(&spec).await?;

        let url = dependent.health_url();
        let probe_spec = EndpointSpec::get("dependent-health", dependent.health_path.clone())
            .with_timeout(self.config.probes.request_timeout);
        let readiness =
            wait_until_ready(&mut self.dependent, url, probe_spec, dependent.ready_timeout, dependent.poll_interval)
                .await;
        check_readiness(&dependent.name, readiness, dependent.ready_timeout)
    }

    async fn start_service(&mut self, service: &ServiceUnderTestConfig) -> Result<()> {
        if let Some(build) = &service.build {
            self.runner.build_service(build).await?;
        }

        let config_path = self
            .config
            .service_config_path()
            .ok_or_else(|| Error::Internal("service under test not configured".to_string()))?;
        ServiceConfigDocument::build(service, self.config.dependent_service.as_ref())
            .write(&config_path)
            .await
            .map_err(|e| e.context("service configuration"))?;

        let binary = self
            .config
            .service_binary()
            .ok_or_else(|| Error::Internal("service under test not configured".to_string()))?;
        let spec = CommandSpec::new(binary.display().to_string())
            .args([service.config_flag.clone(), config_path.display().to_string()])
            .args(service.extra_args.iter().cloned())
            .working_dir(&self.config.project_root)
            .log_file(self.config.artifacts_dir().join(format!("{}.log", service.name)));
        self.service.start(&spec).await?;

        let target = service.target();
        let probe_spec = health_endpoint().with_timeout(self.config.probes.request_timeout);
        let readiness = wait_until_ready(
            &mut self.service,
            target.url(&probe_spec.path),
            probe_spec,
            service.ready_timeout,
            service.poll_interval,
        )
        .await;
        check_readiness(&service.name, readiness, service.ready_timeout)
    }

    /// Stop the service under test, then the dependent service, then remove
    /// the dependent's data directory if this run created it. Every step
    /// runs; failures are logged and returned.
    async fn cleanup(&mut self) -> Vec<String> {
        info!("Cleaning up");
        let mut errors = Vec::new();

        let service_grace = self
            .config
            .service_under_test
            .as_ref()
            .map(|s| s.stop_grace_period)
            .unwrap_or(Duration::from_secs(5));
        let dependent_grace = self
            .config
            .dependent_service
            .as_ref()
            .map(|d| d.stop_grace_period)
            .unwrap_or(Duration::from_secs(5));

        for (supervisor, grace) in [
            (&mut self.service, service_grace),
            (&mut self.dependent, dependent_grace),
        ] {
            match supervisor.stop(grace).await {
                Ok(outcome) => info!("{} stopped: {:?}", supervisor.name(), outcome),
                Err(e) => {
                    error!("Failed to stop {}: {}", supervisor.name(), e);
                    errors.push(e.to_string());
                }
            }
        }

        if let Some(data_dir) = self.created_data_dir.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&data_dir).await {
                warn!("Failed to remove {}: {}", data_dir.display(), e);
                errors.push(format!("remove {}: {}", data_dir.display(), e));
            }
        }

        errors
    }
}

async fn wait_until_ready(
    supervisor: &mut ProcessSupervisor,
    url: String,
    spec: EndpointSpec,
    ready_timeout: Duration,
    poll_interval: Duration,
) -> Readiness {
    let prober = HttpProber::new();
    supervisor
        .wait_ready(
            || {
                let prober = prober.clone();
                let url = url.clone();
                let spec = spec.clone();
                async move { prober.probe_url(&url, &spec).await.is_success() }
            },
            ready_timeout,
            poll_interval,
        )
        .await
}

fn check_readiness(name: &str, readiness: Readiness, ready_timeout: Duration) -> Result<()> {
    match readiness {
        Readiness::Ready { .. } => Ok(()),
        Readiness::TimedOut { attempts, .. } => Err(Error::setup(
            name,
            format!("not ready within {:?} ({} probes)", ready_timeout, attempts),
        )),
        Readiness::Exited { exit_code, .. } => Err(Error::setup(
            name,
            format!("exited before becoming ready (exit code {:?})", exit_code),
        )),
    }
}
