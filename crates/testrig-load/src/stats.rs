//! Load results and latency percentiles.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use testrig_common::{PhaseName, PhaseOutcome};

/// A load burst passes when its success ratio is strictly above this.
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.95;

/// Latency percentiles over requests that completed before their timeout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: u32,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    /// `None` when there are no samples.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut v: Vec<u64> = samples.iter().map(|d| d.as_micros() as u64).collect();
        v.sort_unstable();
        let max = v.last().copied().unwrap_or(0);
        Some(Self {
            samples: v.len() as u32,
            p50_ms: us_to_ms(percentile_sorted_us(&v, 50)),
            p95_ms: us_to_ms(percentile_sorted_us(&v, 95)),
            p99_ms: us_to_ms(percentile_sorted_us(&v, 99)),
            max_ms: us_to_ms(max),
        })
    }
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn percentile_sorted_us(sorted_us: &[u64], p: u64) -> u64 {
    if sorted_us.is_empty() {
        return 0;
    }
    if sorted_us.len() == 1 {
        return sorted_us[0];
    }
    let n_minus_1 = (sorted_us.len() - 1) as u64;
    // ceil(p * (n-1) / 100)
    let idx = ((p * n_minus_1) + 99) / 100;
    sorted_us[idx as usize]
}

/// Outcome of one load burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub total_requests: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Requests abandoned at their timeout; included in `failed`.
    pub timed_out: u32,
    /// `succeeded / total_requests`, 0 for an empty burst.
    pub success_ratio: f64,
    #[serde(with = "testrig_common::types::duration_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyStats>,
}

impl LoadSummary {
    pub fn meets(&self, threshold: f64) -> bool {
        self.success_ratio > threshold
    }

    /// Judge the burst as a load phase outcome.
    pub fn judge(&self, threshold: f64) -> PhaseOutcome {
        let detail = format!(
            "{}/{} requests succeeded (ratio {:.3}, threshold {:.3})",
            self.succeeded, self.total_requests, self.success_ratio, threshold
        );
        if self.meets(threshold) {
            PhaseOutcome::passed(PhaseName::Load, self.duration, detail)
        } else {
            PhaseOutcome::failed(PhaseName::Load, self.duration, detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testrig_common::PhaseStatus;

    #[test]
    fn test_percentile_ceil_index() {
        let v: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile_sorted_us(&v, 50), 51);
        assert_eq!(percentile_sorted_us(&v, 99), 100);
        assert_eq!(percentile_sorted_us(&[7], 95), 7);
        assert_eq!(percentile_sorted_us(&[], 95), 0);
    }

    #[test]
    fn test_latency_stats() {
        let samples: Vec<Duration> = (1..=10).map(Duration::from_millis).collect();
        let stats = LatencyStats::from_samples(&samples).unwrap();
        assert_eq!(stats.samples, 10);
        assert_eq!(stats.max_ms, 10.0);
        assert_eq!(stats.p50_ms, 6.0);
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    fn summary(succeeded: u32, total: u32) -> LoadSummary {
        LoadSummary {
            total_requests: total,
            succeeded,
            failed: total - succeeded,
            timed_out: 0,
            success_ratio: succeeded as f64 / total as f64,
            duration: Duration::from_secs(1),
            latency: None,
        }
    }

    #[test]
    fn test_judge_strictly_above_threshold() {
        assert_eq!(summary(96, 100).judge(0.95).status(), PhaseStatus::Passed);
        assert_eq!(summary(95, 100).judge(0.95).status(), PhaseStatus::Failed);

        let outcome = summary(67, 100).judge(DEFAULT_SUCCESS_THRESHOLD);
        assert!(outcome.is_failed());
        assert!(!outcome.is_blocking());
        assert!(outcome.detail().contains("67/100"));
    }
}
