//! Bounded-concurrency request bursts.

use crate::stats::{LatencyStats, LoadSummary};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use testrig_common::ServiceTarget;
use testrig_probe::{EndpointSpec, HttpProber};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One request of a load burst. Returns whether it succeeded.
#[async_trait]
pub trait RequestProbe: Send + Sync + 'static {
    async fn probe(&self) -> bool;
}

/// Issues `spec` against `target` over a shared connection pool.
pub struct HttpRequestProbe {
    prober: HttpProber,
    target: ServiceTarget,
    spec: EndpointSpec,
}

impl HttpRequestProbe {
    pub fn new(target: ServiceTarget, spec: EndpointSpec) -> Self {
        Self {
            prober: HttpProber::new(),
            target,
            spec,
        }
    }
}

#[async_trait]
impl RequestProbe for HttpRequestProbe {
    async fn probe(&self) -> bool {
        self.prober.probe(&self.target, &self.spec).await.is_success()
    }
}

/// Result of one spawned request: `None` latency means it timed out.
type RequestResult = (bool, Option<Duration>);

/// Runs bursts of requests with at most `concurrency` in flight.
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    concurrency: usize,
    request_timeout: Duration,
}

impl LoadGenerator {
    /// `concurrency` is clamped to at least 1.
    pub fn new(concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            request_timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Dispatch `total_requests` independent probes and collect every result.
    ///
    /// A request that fails, times out or panics counts as one failure and
    /// never affects the others. Dropping the returned future aborts all
    /// in-flight requests.
    pub async fn run(&self, probe: Arc<dyn RequestProbe>, total_requests: u32) -> LoadSummary {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<RequestResult> = JoinSet::new();
        let mut tally = Tally::default();

        info!(
            "Load burst: {} requests, concurrency {}, timeout {:?}",
            total_requests, self.concurrency, self.request_timeout
        );

        for _ in 0..total_requests {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    error!("Load semaphore closed unexpectedly: {}", e);
                    tally.record_failure();
                    continue;
                }
            };

            let probe = Arc::clone(&probe);
            let request_timeout = self.request_timeout;
            join_set.spawn(async move {
                let _permit = permit;
                let start = Instant::now();
                match tokio::time::timeout(request_timeout, probe.probe()).await {
                    Ok(ok) => (ok, Some(start.elapsed())),
                    Err(_) => (false, None),
                }
            });

            // Finished tasks stay in the set until joined.
            while join_set.len() > self.concurrency {
                if let Some(res) = join_set.join_next().await {
                    tally.record(res);
                }
            }
        }

        while let Some(res) = join_set.join_next().await {
            tally.record(res);
        }

        let summary = tally.finish(total_requests, started.elapsed());
        debug!(
            "Load burst complete: {}/{} succeeded, {} timed out",
            summary.succeeded, summary.total_requests, summary.timed_out
        );
        summary
    }
}

#[derive(Default)]
struct Tally {
    succeeded: u32,
    failed: u32,
    timed_out: u32,
    latencies: Vec<Duration>,
}

impl Tally {
    fn record(&mut self, res: Result<RequestResult, tokio::task::JoinError>) {
        match res {
            Ok((ok, latency)) => {
                match latency {
                    Some(latency) => self.latencies.push(latency),
                    None => self.timed_out += 1,
                }
                if ok {
                    self.succeeded += 1;
                } else {
                    self.failed += 1;
                }
            }
            Err(e) => {
                if e.is_panic() {
                    error!("Load request task panicked: {}", e);
                } else {
                    warn!("Load request task cancelled: {}", e);
                }
                self.record_failure();
            }
        }
    }

    fn record_failure(&mut self) {
        self.failed += 1;
    }

    fn finish(self, total_requests: u32, duration: Duration) -> LoadSummary {
        let success_ratio = if total_requests == 0 {
            0.0
        } else {
            self.succeeded as f64 / total_requests as f64
        };
        LoadSummary {
            total_requests,
            succeeded: self.succeeded,
            failed: self.failed,
            timed_out: self.timed_out,
            success_ratio,
            duration,
            latency: LatencyStats::from_samples(&self.latencies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EveryThirdFails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestProbe for EveryThirdFails {
        async fn probe(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            n % 3 != 2
        }
    }

    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RequestProbe for InFlight {
        async fn probe(&self) -> bool {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            true
        }
    }

    struct Panics;

    #[async_trait]
    impl RequestProbe for Panics {
        async fn probe(&self) -> bool {
            panic!("probe blew up");
        }
    }

    struct Hangs;

    #[async_trait]
    impl RequestProbe for Hangs {
        async fn probe(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    #[tokio::test]
    async fn test_every_third_failure_ratio() {
        let probe = Arc::new(EveryThirdFails {
            calls: AtomicUsize::new(0),
        });
        let summary = LoadGenerator::new(20, Duration::from_secs(1))
            .run(probe, 100)
            .await;

        assert_eq!(summary.total_requests, 100);
        assert_eq!(summary.succeeded, 67);
        assert_eq!(summary.failed, 33);
        assert!((summary.success_ratio - 0.67).abs() < 1e-9);
        assert!(summary.judge(0.95).is_failed());
        assert_eq!(summary.latency.map(|l| l.samples), Some(100));
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let probe = Arc::new(InFlight {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let summary = LoadGenerator::new(4, Duration::from_secs(1))
            .run(probe.clone(), 40)
            .await;

        assert_eq!(summary.success_ratio, 1.0);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak in-flight {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_panicking_requests_count_as_failures() {
        let summary = LoadGenerator::new(3, Duration::from_secs(1))
            .run(Arc::new(Panics), 5)
            .await;
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.success_ratio, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_requests_abandoned() {
        let summary = LoadGenerator::new(10, Duration::from_millis(100))
            .run(Arc::new(Hangs), 10)
            .await;
        assert_eq!(summary.timed_out, 10);
        assert_eq!(summary.failed, 10);
        assert!(summary.latency.is_none());
    }

    #[tokio::test]
    async fn test_zero_concurrency_clamped_and_empty_burst() {
        let generator = LoadGenerator::new(0, Duration::from_secs(1));
        assert_eq!(generator.concurrency(), 1);

        let summary = generator
            .run(
                Arc::new(EveryThirdFails {
                    calls: AtomicUsize::new(0),
                }),
                0,
            )
            .await;
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.success_ratio, 0.0);
    }
}
