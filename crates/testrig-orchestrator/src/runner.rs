//! Phase execution.
//!
//! Each `run_*` method produces exactly one `PhaseOutcome` and never returns
//! an error: runner start failures, timeouts and nonzero exits all become a
//! Failed outcome with the reason in its detail.

use crate::config::duration_serde::format_duration;
use crate::config::{BuildConfig, OrchestratorConfig};
use crate::options::RunOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use testrig_common::{
    BenchmarkRecord, Error, PhaseName, PhaseOutcome, Result, ServiceTarget,
};
use testrig_load::{HttpRequestProbe, LoadGenerator, LoadSummary};
use testrig_probe::{api_check_suite, benchmark_endpoint, EndpointSpec, HttpProber, ProbeResult};
use testrig_process::{ToolInvocation, ToolOutput, ToolRunner};
use testrig_results::{parse_benchmarks, parse_coverage, CoverageParse};
use tracing::{debug, info, warn};

/// Coverage data gathered after the unit phase.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageArtifacts {
    pub parse: CoverageParse,
    pub html: Option<PathBuf>,
}

impl CoverageArtifacts {
    fn absent() -> Self {
        Self {
            parse: CoverageParse::NoCoverage,
            html: None,
        }
    }
}

/// How one runner invocation went, before it is turned into an outcome.
struct Verdict {
    passed: bool,
    detail: String,
    exit_code: Option<i32>,
    duration: Duration,
    output: String,
}

impl Verdict {
    fn into_outcome(self, phase: PhaseName, tail_bytes: usize) -> PhaseOutcome {
        let outcome = if self.passed {
            PhaseOutcome::passed(phase, self.duration, self.detail)
        } else {
            PhaseOutcome::failed(phase, self.duration, self.detail)
        };
        outcome
            .with_exit_code(self.exit_code)
            .with_diagnostics(output_tail(&self.output, tail_bytes))
    }
}

pub struct PhaseRunner {
    tools: Arc<dyn ToolRunner>,
    config: OrchestratorConfig,
    options: RunOptions,
    prober: HttpProber,
}

impl PhaseRunner {
    pub fn new(tools: Arc<dyn ToolRunner>, config: OrchestratorConfig, options: RunOptions) -> Self {
        Self {
            tools,
            config,
            options,
            prober: HttpProber::new(),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn runner_invocation(&self, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new(&self.config.runner.program)
            .working_dir(&self.config.project_root)
            .timeout(timeout + self.config.runner.kill_margin)
    }

    fn package_selector(&self) -> String {
        match &self.options.package {
            Some(package) => format!(
                "./{}/...",
                package.trim_start_matches("./").trim_end_matches("/...")
            ),
            None => "./...".to_string(),
        }
    }

    pub fn unit_invocation(&self) -> ToolInvocation {
        let runner = &self.config.runner;
        let mut invocation = self
            .runner_invocation(runner.unit_timeout)
            .args(["test".to_string(), self.package_selector(), "-v".to_string()])
            .arg(format!("-coverprofile={}", self.config.coverage_profile().display()))
            .arg("-covermode=atomic");
        if self.options.unit_race() {
            invocation = invocation.arg("-race");
        }
        invocation = invocation.arg(format!("-timeout={}", format_duration(runner.unit_timeout)));
        if self.options.quick {
            invocation = invocation.arg("-short");
        }
        invocation
    }

    pub fn integration_invocation(&self) -> ToolInvocation {
        let runner = &self.config.runner;
        let suite = format!(
            "./{}/...",
            self.config.integration_dir.display().to_string().trim_end_matches('/')
        );
        let mut invocation = self
            .runner_invocation(runner.integration_timeout)
            .args(["test", "-v", "-tags=integration"])
            .arg(format!("-timeout={}", format_duration(runner.integration_timeout)))
            .arg(suite);
        if self.options.integration_race() {
            invocation = invocation.arg("-race");
        }
        invocation
    }

    pub fn benchmark_invocation(&self) -> ToolInvocation {
        let runner = &self.config.runner;
        self.runner_invocation(runner.benchmark_timeout)
            .args(["test", "-bench=.", "-benchmem"])
            .arg(format!("-benchtime={}", runner.benchmark_time))
            .arg("-run=^$")
            .arg(self.package_selector())
    }

    /// Run the tool and classify the result. Exit code 0 passes.
    async fn execute(&self, phase: PhaseName, invocation: &ToolInvocation) -> Verdict {
        info!("Running {} phase: {}", phase, invocation.command_line());
        let started = Instant::now();

        match self.tools.run(invocation).await {
            Ok(output) => self.classify(phase, output),
            Err(e) => {
                warn!("{} phase runner could not start: {}", phase, e);
                Verdict {
                    passed: false,
                    detail: format!("runner could not be started: {}", e),
                    exit_code: None,
                    duration: started.elapsed(),
                    output: String::new(),
                }
            }
        }
    }

    fn classify(&self, phase: PhaseName, output: ToolOutput) -> Verdict {
        let combined = output.combined();
        if self.options.verbose && !combined.is_empty() {
            info!("{} phase output:\n{}", phase, combined);
        }

        let detail = if output.timed_out {
            format!("runner timed out after {:?}", output.duration)
        } else {
            match output.exit_code {
                Some(0) => "runner exited with code 0".to_string(),
                Some(code) => format!("runner exited with code {}", code),
                None => "runner was terminated by a signal".to_string(),
            }
        };
        debug!("{} phase finished: {}", phase, detail);

        Verdict {
            passed: output.success(),
            detail,
            exit_code: output.exit_code,
            duration: output.duration,
            output: combined,
        }
    }

    pub async fn run_unit(&self) -> PhaseOutcome {
        let invocation = self.unit_invocation();
        self.execute(PhaseName::Unit, &invocation)
            .await
            .into_outcome(PhaseName::Unit, self.config.runner.output_tail_bytes)
    }

    /// Skipped when the integration suite directory does not exist. When a
    /// service target is given, the API check suite runs after the runner
    /// and any failing check fails the phase.
    pub async fn run_integration(&self, target: Option<&ServiceTarget>) -> PhaseOutcome {
        let suite_dir = self.config.integration_path();
        if !suite_dir.is_dir() {
            info!("No integration suite at {}, skipping", suite_dir.display());
            return PhaseOutcome::skipped(
                PhaseName::Integration,
                format!("integration suite directory {} not found", suite_dir.display()),
            );
        }

        let invocation = self.integration_invocation();
        let mut verdict = self.execute(PhaseName::Integration, &invocation).await;

        if let Some(target) = target {
            let started = Instant::now();
            let results = self.run_api_checks(target).await;
            verdict.duration += started.elapsed();

            let failed: Vec<&ProbeResult> = results.iter().filter(|r| !r.is_success()).collect();
            for result in &results {
                verdict.output.push_str(&format!("\n{}", describe_probe(result)));
            }
            if failed.is_empty() {
                verdict.detail.push_str(&format!("; {} API checks passed", results.len()));
            } else {
                verdict.passed = false;
                verdict.detail.push_str(&format!(
                    "; {} of {} API checks failed",
                    failed.len(),
                    results.len()
                ));
            }
        }

        verdict.into_outcome(PhaseName::Integration, self.config.runner.output_tail_bytes)
    }

    /// A nonzero runner exit is recorded as a Failed outcome; benchmark
    /// records are parsed from whatever output there is.
    pub async fn run_benchmark(
        &self,
        target: Option<&ServiceTarget>,
    ) -> (PhaseOutcome, Vec<BenchmarkRecord>) {
        let invocation = self.benchmark_invocation();
        info!("Running {} phase: {}", PhaseName::Benchmark, invocation.command_line());
        let started = Instant::now();
        let (mut verdict, records) = match self.tools.run(&invocation).await {
            Ok(output) => {
                let records = parse_benchmarks(&output.stdout);
                self.save_artifact(&self.config.benchmark_output_file(), &output.stdout)
                    .await;
                (self.classify(PhaseName::Benchmark, output), records)
            }
            Err(e) => (
                Verdict {
                    passed: false,
                    detail: format!("runner could not be started: {}", e),
                    exit_code: None,
                    duration: started.elapsed(),
                    output: String::new(),
                },
                Vec::new(),
            ),
        };
        verdict
            .detail
            .push_str(&format!("; {} benchmark results", records.len()));

        if let Some(target) = target {
            let spec = benchmark_endpoint(self.config.probes.benchmark_operations)
                .with_timeout(self.config.probes.request_timeout);
            let result = self.prober.probe(target, &spec).await;
            verdict.output.push_str(&format!("\n{}", describe_probe(&result)));
            match result.status {
                Some(status) if result.is_success() => verdict
                    .detail
                    .push_str(&format!("; benchmark endpoint answered {}", status)),
                _ => {
                    verdict.passed = false;
                    verdict.detail.push_str("; benchmark endpoint check failed");
                }
            }
        }

        (
            verdict.into_outcome(PhaseName::Benchmark, self.config.runner.output_tail_bytes),
            records,
        )
    }

    pub async fn run_load(&self, target: &ServiceTarget) -> (PhaseOutcome, LoadSummary) {
        let load = &self.config.load;
        info!(
            "Running {} phase against {}{}",
            PhaseName::Load,
            target,
            load.path
        );
        let spec = EndpointSpec::get("load", load.path.clone()).with_timeout(load.request_timeout);
        let probe = Arc::new(HttpRequestProbe::new(target.clone(), spec));
        let summary = LoadGenerator::new(load.concurrency, load.request_timeout)
            .run(probe, load.total_requests)
            .await;
        (summary.judge(load.success_threshold), summary)
    }

    /// Probe every endpoint of the API check suite, in order.
    pub async fn run_api_checks(&self, target: &ServiceTarget) -> Vec<ProbeResult> {
        let mut results = Vec::new();
        for spec in api_check_suite() {
            let spec = spec.with_timeout(self.config.probes.request_timeout);
            let result = self.prober.probe(target, &spec).await;
            if !result.is_success() {
                warn!("API check {} failed: {}", spec.name, describe_probe(&result));
            }
            results.push(result);
        }
        results
    }

    /// One bounded probe; any failure is `false`.
    pub async fn run_http_probe(&self, target: &ServiceTarget, spec: &EndpointSpec) -> bool {
        self.prober.probe(target, spec).await.is_success()
    }

    /// Render the coverage profile as HTML and parse the per-function table.
    /// A missing profile or a failing coverage tool means "no coverage".
    pub async fn generate_coverage(&self) -> CoverageArtifacts {
        let profile = self.config.coverage_profile();
        if !profile.is_file() {
            info!("No coverage profile at {}", profile.display());
            return CoverageArtifacts::absent();
        }
        let timeout = self.config.runner.coverage_timeout;
        let html_path = self.config.coverage_html();

        let html_invocation = self
            .runner_invocation(timeout)
            .args(["tool", "cover"])
            .arg(format!("-html={}", profile.display()))
            .arg(format!("-o={}", html_path.display()));
        let html = match self.tools.run(&html_invocation).await {
            Ok(output) if output.success() => Some(html_path),
            Ok(output) => {
                warn!("Coverage HTML generation failed: {}", output.combined().trim());
                None
            }
            Err(e) => {
                warn!("Coverage HTML generation failed: {}", e);
                None
            }
        };

        let func_invocation = self
            .runner_invocation(timeout)
            .args(["tool", "cover"])
            .arg(format!("-func={}", profile.display()));
        let parse = match self.tools.run(&func_invocation).await {
            Ok(output) if output.success() => {
                self.save_artifact(&self.config.coverage_summary_file(), &output.stdout)
                    .await;
                parse_coverage(&output.stdout)
            }
            Ok(output) => {
                warn!("Coverage table generation failed: {}", output.combined().trim());
                CoverageParse::NoCoverage
            }
            Err(e) => {
                warn!("Coverage table generation failed: {}", e);
                CoverageParse::NoCoverage
            }
        };

        if let CoverageParse::Malformed { line, reason } = &parse {
            warn!("Coverage total unreadable ({}): {}", reason, line);
        }

        CoverageArtifacts { parse, html }
    }

    /// Build the service under test. Failure is a setup error.
    pub async fn build_service(&self, build: &BuildConfig) -> Result<()> {
        let invocation = ToolInvocation::new(&build.program)
            .args(build.args.iter().cloned())
            .working_dir(&self.config.project_root)
            .timeout(build.timeout);
        info!("Building service under test: {}", invocation.command_line());

        let output = self.tools.run(&invocation).await.map_err(|e| e.context("build"))?;
        if output.success() {
            return Ok(());
        }
        let reason = if output.timed_out {
            format!("build timed out after {:?}", build.timeout)
        } else {
            format!(
                "build exited with {:?}: {}",
                output.exit_code,
                output_tail(output.combined().trim(), 2048)
            )
        };
        Err(Error::setup("build", reason))
    }

    async fn save_artifact(&self, path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        match tokio::fs::write(path, contents).await {
            Ok(()) => debug!("Saved {}", path.display()),
            Err(e) => warn!("Failed to save {}: {}", path.display(), e),
        }
    }
}

fn describe_probe(result: &ProbeResult) -> String {
    match (&result.failure, result.status) {
        (None, Some(status)) => format!("PASS {} ({}, {:?})", result.endpoint, status, result.latency),
        (None, None) => format!("PASS {}", result.endpoint),
        (Some(failure), _) => format!("FAIL {}: {}", result.endpoint, failure),
    }
}

/// Keep the last `max_bytes` of `text`, cut on a character boundary.
pub(crate) fn output_tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[{} bytes truncated]\n{}", start, &text[start..])
}
