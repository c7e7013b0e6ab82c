use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use testrig_common::PhaseStatus;
use testrig_orchestrator::{
    OrchestratorConfig, PhaseSelection, RunOptions, RunSummary, TestOrchestrator,
    EXIT_CONFIG_ERROR, EXIT_INTERRUPTED,
};
use testrig_process::ProcessToolRunner;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// testrig - run a project's test phases and publish a report
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run every phase plus coverage (the default when nothing is selected)
    #[arg(long)]
    all: bool,

    /// Run unit tests
    #[arg(long)]
    unit: bool,

    /// Run integration tests against the started services
    #[arg(long)]
    integration: bool,

    /// Run benchmarks
    #[arg(long)]
    benchmark: bool,

    /// Generate the coverage report
    #[arg(long)]
    coverage: bool,

    /// Run the load phase
    #[arg(long)]
    load: bool,

    /// Enable race detection
    #[arg(long)]
    race: bool,

    /// Echo test runner output
    #[arg(short, long)]
    verbose: bool,

    /// Short mode for unit tests
    #[arg(long)]
    quick: bool,

    /// Restrict unit tests and benchmarks to one package
    #[arg(long, value_name = "PACKAGE")]
    package: Option<String>,

    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn run_options(&self) -> RunOptions {
        let selection = if self.all {
            PhaseSelection::all()
        } else {
            PhaseSelection {
                unit: self.unit,
                integration: self.integration,
                benchmark: self.benchmark,
                load: self.load,
                coverage: self.coverage,
            }
        };
        RunOptions {
            race: self.race,
            quick: self.quick,
            verbose: self.verbose,
            package: self.package.clone(),
            ..RunOptions::with_selection(selection)
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    initialize_logging(args.debug);

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    info!("Starting testrig");
    info!("Project root: {}", config.project_root.display());
    info!("Artifacts: {}", config.artifacts_dir().display());

    let orchestrator =
        TestOrchestrator::new(config, args.run_options(), Arc::new(ProcessToolRunner));
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        cancel_on_signal(wait_for_shutdown_signal, cancel).await;
        warn!("Second shutdown signal received, exiting before cleanup finished");
        std::process::exit(EXIT_INTERRUPTED);
    });

    let summary = orchestrator.run().await;
    print_summary(&summary);
    std::process::exit(summary.exit_code);
}

fn load_config(path: Option<&PathBuf>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            info!("Config file: {}", path.display());
            OrchestratorConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))
        }
        None => {
            let config = OrchestratorConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

/// Cancel the run on the first signal; return on the second.
async fn cancel_on_signal<F, Fut>(mut next_signal: F, cancel: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    next_signal().await;
    info!("Shutdown requested, cleaning up");
    cancel.cancel();
    next_signal().await;
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}

fn coverage_grade(percent: f64) -> &'static str {
    if percent >= 95.0 {
        "EXCELLENT"
    } else if percent >= 80.0 {
        "GOOD"
    } else if percent >= 60.0 {
        "NEEDS IMPROVEMENT"
    } else {
        "CRITICAL"
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("==================== Test Summary ====================");

    if summary.interrupted {
        println!("Run interrupted by operator");
    }
    if let Some(e) = &summary.setup_error {
        println!("Setup failed: {}", e);
    }

    if let Some(report) = &summary.report {
        for phase in report.phases() {
            let mark = match phase.status() {
                PhaseStatus::Passed => "PASSED",
                PhaseStatus::Failed if phase.is_blocking() => "FAILED",
                PhaseStatus::Failed => "FAILED (non-blocking)",
                PhaseStatus::Skipped => "SKIPPED",
            };
            println!(
                "  {:<12} {:<22} {:>8.2}s  {}",
                phase.name(),
                mark,
                phase.duration().as_secs_f64(),
                phase.detail()
            );
        }

        if let Some(coverage) = report.coverage() {
            let percent = coverage.overall_percent();
            println!("  Coverage: {:.1}% ({})", percent, coverage_grade(percent));
        }
        if let Some(html) = report.coverage_html() {
            println!("  Coverage report: {}", html.display());
        }
        for bench in report.benchmarks() {
            println!(
                "  {:<40} {:>14.0} ops/s  {:>10.4} ms/op",
                bench.name, bench.ops_per_sec, bench.avg_latency_ms
            );
        }
        if let Some(load) = report.load() {
            println!(
                "  Load: {}/{} succeeded ({:.1}%)",
                load.succeeded,
                load.total_requests,
                load.success_ratio * 100.0
            );
            if let Some(latency) = &load.latency {
                println!(
                    "  Load latency: p50 {:.2}ms  p95 {:.2}ms  p99 {:.2}ms  max {:.2}ms",
                    latency.p50_ms, latency.p95_ms, latency.p99_ms, latency.max_ms
                );
            }
        }

        let totals = report.summary();
        println!(
            "  Phases: {} passed, {} failed, {} skipped in {:.2}s",
            totals.passed, totals.failed, totals.skipped, totals.duration_secs
        );
    }

    if let Some(path) = &summary.report_path {
        println!("  Report: {}", path.display());
    }
    if let Some(e) = &summary.publish_error {
        println!("  Report not written: {}", e);
    }
    for e in &summary.cleanup_errors {
        println!("  Cleanup: {}", e);
    }

    let verdict = if summary.overall_success() {
        "SUCCESS"
    } else {
        "FAILURE"
    };
    println!("Result: {} (exit code {})", verdict, summary.exit_code);
    println!("======================================================");
}
