use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use testrig_common::{BenchmarkRecord, CoverageSummary, PhaseOutcome, PhaseStatus};
use testrig_load::LoadSummary;

/// Counts and the overall verdict of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_phases: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Failed phases that do not affect `overall_success`.
    pub failed_non_blocking: u32,
    pub coverage_percent: Option<f64>,
    pub duration_secs: f64,
    pub overall_success: bool,
}

/// Final artifact of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    phases: Vec<PhaseOutcome>,
    coverage: Option<CoverageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coverage_html: Option<PathBuf>,
    benchmarks: Vec<BenchmarkRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    load: Option<LoadSummary>,
    summary: ReportSummary,
}

impl Report {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn phases(&self) -> &[PhaseOutcome] {
        &self.phases
    }

    pub fn coverage(&self) -> Option<&CoverageSummary> {
        self.coverage.as_ref()
    }

    pub fn coverage_html(&self) -> Option<&Path> {
        self.coverage_html.as_deref()
    }

    pub fn benchmarks(&self) -> &[BenchmarkRecord] {
        &self.benchmarks
    }

    pub fn load(&self) -> Option<&LoadSummary> {
        self.load.as_ref()
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    pub fn overall_success(&self) -> bool {
        self.summary.overall_success
    }

    /// Whether any non-blocking phase failed.
    pub fn has_non_blocking_failures(&self) -> bool {
        self.summary.failed_non_blocking > 0
    }
}

/// Collects run results as phases complete.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    phases: Vec<PhaseOutcome>,
    coverage: Option<CoverageSummary>,
    coverage_html: Option<PathBuf>,
    benchmarks: Vec<BenchmarkRecord>,
    load: Option<LoadSummary>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_phase(&mut self, outcome: PhaseOutcome) {
        self.phases.push(outcome);
    }

    pub fn phases(&self) -> &[PhaseOutcome] {
        &self.phases
    }

    pub fn set_coverage(&mut self, coverage: Option<CoverageSummary>, html: Option<PathBuf>) {
        self.coverage = coverage;
        self.coverage_html = html;
    }

    pub fn extend_benchmarks(&mut self, records: impl IntoIterator<Item = BenchmarkRecord>) {
        self.benchmarks.extend(records);
    }

    pub fn set_load(&mut self, load: LoadSummary) {
        self.load = Some(load);
    }

    /// Whether a blocking phase has failed so far.
    pub fn has_blocking_failure(&self) -> bool {
        self.phases.iter().any(|p| p.is_blocking() && p.is_failed())
    }

    /// Build the immutable report.
    ///
    /// `overall_success` holds when no blocking phase failed. A skipped
    /// blocking phase does not count against it.
    pub fn finalize(self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Report {
        let mut summary = ReportSummary {
            total_phases: self.phases.len() as u32,
            passed: 0,
            failed: 0,
            skipped: 0,
            failed_non_blocking: 0,
            coverage_percent: self.coverage.as_ref().map(|c| c.overall_percent()),
            duration_secs: (finished_at - started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            overall_success: true,
        };

        for phase in &self.phases {
            match phase.status() {
                PhaseStatus::Passed => summary.passed += 1,
                PhaseStatus::Skipped => summary.skipped += 1,
                PhaseStatus::Failed => {
                    summary.failed += 1;
                    if phase.is_blocking() {
                        summary.overall_success = false;
                    } else {
                        summary.failed_non_blocking += 1;
                    }
                }
            }
        }

        Report {
            started_at,
            finished_at,
            phases: self.phases,
            coverage: self.coverage,
            coverage_html: self.coverage_html,
            benchmarks: self.benchmarks,
            load: self.load,
            summary,
        }
    }
}
