//! ProcessSupervisor - start, readiness polling and graceful stop for one
//! subprocess.

use crate::handle::{CommandSpec, ProcessHandle};
use std::future::Future;
use std::process::Stdio;
use testrig_common::{SupervisorError, SupervisorResult};
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long to wait for exit after SIGKILL before giving up.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of `wait_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { elapsed: Duration, attempts: u32 },
    TimedOut { elapsed: Duration, attempts: u32 },
    /// The supervised process exited before the probe ever succeeded.
    Exited {
        elapsed: Duration,
        exit_code: Option<i32>,
    },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Result of `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no process to stop.
    AlreadyStopped,
    /// The process is gone; `forced` is set when SIGKILL was needed.
    Exited { exit_code: Option<i32>, forced: bool },
}

/// Supervises at most one subprocess at a time.
#[derive(Debug)]
pub struct ProcessSupervisor {
    name: String,
    handle: Option<ProcessHandle>,
}

impl ProcessSupervisor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }

    /// Whether a process is held and still alive.
    pub fn is_running(&mut self) -> bool {
        self.handle.as_mut().map(|h| h.is_alive()).unwrap_or(false)
    }

    /// Spawn the process described by `spec`.
    ///
    /// Fails with `AlreadyRunning` if this supervisor still holds a live
    /// process. A held process that has already exited is replaced.
    pub async fn start(&mut self, spec: &CommandSpec) -> SupervisorResult<&ProcessHandle> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.is_alive() {
                return Err(SupervisorError::AlreadyRunning {
                    name: self.name.clone(),
                    pid: handle.pid,
                });
            }
            debug!("Discarding exited process for {} (PID: {})", self.name, handle.pid);
            self.handle = None;
        }

        info!("Starting {}: {}", self.name, spec.command_line());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        match spec.log_file {
            Some(ref path) => {
                let (stdout, stderr) = open_log_file(path)
                    .map_err(|e| SupervisorError::spawn_failed(&self.name, e))?;
                cmd.stdout(stdout).stderr(stderr);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn_failed(&self.name, e.to_string()))?;
        let pid = child.id().ok_or_else(|| {
            SupervisorError::spawn_failed(&self.name, "process exited before its PID was read")
        })?;

        info!("Process spawned successfully: {} (PID: {})", self.name, pid);

        let handle = self.handle.insert(ProcessHandle {
            pid,
            command_line: spec.command_line(),
            working_dir: spec.working_dir.clone(),
            started_at: chrono::Utc::now(),
            child,
        });
        Ok(&*handle)
    }

    /// Poll `probe` every `poll_interval` until it returns `true` or the
    /// cumulative wait reaches `timeout`.
    ///
    /// A single probe invocation is cut off at the remaining budget, so a hung
    /// probe cannot stretch the wait. If the supervised process exits while
    /// waiting, `Readiness::Exited` is returned without waiting out the
    /// timeout. With no process held, only the probe is consulted.
    pub async fn wait_ready<F, Fut>(
        &mut self,
        mut probe: F,
        timeout_dur: Duration,
        poll_interval: Duration,
    ) -> Readiness
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;

        debug!(
            "Waiting for {} to become ready (timeout: {:?}, interval: {:?})",
            self.name, timeout_dur, poll_interval
        );

        loop {
            if let Some(handle) = self.handle.as_mut() {
                if let Ok(Some(status)) = handle.child.try_wait() {
                    warn!(
                        "{} exited before becoming ready (PID: {}, status: {})",
                        self.name, handle.pid, status
                    );
                    return Readiness::Exited {
                        elapsed: started.elapsed(),
                        exit_code: status.code(),
                    };
                }
            }

            let remaining = timeout_dur.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            let ready = timeout(remaining, probe()).await.unwrap_or(false);
            if ready {
                let elapsed = started.elapsed();
                info!("{} is ready after {:?} ({} probes)", self.name, elapsed, attempts);
                return Readiness::Ready { elapsed, attempts };
            }

            let remaining = timeout_dur.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            sleep(poll_interval.min(remaining)).await;
        }

        let elapsed = started.elapsed();
        warn!(
            "{} did not become ready within {:?} ({} probes)",
            self.name, timeout_dur, attempts
        );
        Readiness::TimedOut { elapsed, attempts }
    }

    /// Stop the held process: graceful signal, wait up to `grace_period`,
    /// then force kill.
    ///
    /// Idempotent: with no process held this returns `AlreadyStopped`. The
    /// handle is released even when an error is returned, so a second call
    /// never repeats the error.
    pub async fn stop(&mut self, grace_period: Duration) -> SupervisorResult<StopOutcome> {
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                debug!("No process to stop for {}", self.name);
                return Ok(StopOutcome::AlreadyStopped);
            }
        };
        let pid = handle.pid;

        if let Ok(Some(status)) = handle.child.try_wait() {
            info!("{} had already exited (PID: {}, status: {})", self.name, pid, status);
            return Ok(StopOutcome::Exited {
                exit_code: status.code(),
                forced: false,
            });
        }

        info!("Stopping {} (PID: {}, grace period: {:?})", self.name, pid, grace_period);
        self.send_graceful_signal(&mut handle);

        match timeout(grace_period, handle.child.wait()).await {
            Ok(Ok(status)) => {
                info!("{} terminated gracefully (PID: {}, status: {})", self.name, pid, status);
                return Ok(StopOutcome::Exited {
                    exit_code: status.code(),
                    forced: false,
                });
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for {} (PID: {}): {}", self.name, pid, e);
            }
            Err(_) => {
                warn!(
                    "Graceful shutdown timed out for {} (PID: {}), attempting force kill",
                    self.name, pid
                );
            }
        }

        self.send_kill(&mut handle);

        match timeout(FORCE_KILL_TIMEOUT, handle.child.wait()).await {
            Ok(Ok(status)) => {
                info!("{} terminated after force kill (PID: {})", self.name, pid);
                Ok(StopOutcome::Exited {
                    exit_code: status.code(),
                    forced: true,
                })
            }
            Ok(Err(e)) => {
                error!("Failed to reap {} (PID: {}): {}", self.name, pid, e);
                Err(SupervisorError::stop_failed(&self.name, e.to_string()))
            }
            Err(_) => Err(SupervisorError::stop_failed(
                &self.name,
                format!(
                    "did not exit after graceful period {:?} + force-kill timeout {:?}",
                    grace_period, FORCE_KILL_TIMEOUT
                ),
            )),
        }
    }

    #[cfg(unix)]
    fn send_graceful_signal(&self, handle: &mut ProcessHandle) {
        if let Err(e) = testrig_process::terminate_gracefully(handle.pid) {
            warn!("Failed to send SIGTERM to {} (PID: {}): {}", self.name, handle.pid, e);
        }
    }

    #[cfg(not(unix))]
    fn send_graceful_signal(&self, handle: &mut ProcessHandle) {
        // No graceful signal available; the grace wait becomes a kill wait.
        if let Err(e) = handle.child.start_kill() {
            warn!("Failed to terminate {} (PID: {}): {}", self.name, handle.pid, e);
        }
    }

    #[cfg(unix)]
    fn send_kill(&self, handle: &mut ProcessHandle) {
        if let Err(e) = testrig_process::force_kill(handle.pid) {
            warn!("Force kill failed for {} (PID: {}): {}", self.name, handle.pid, e);
        }
    }

    #[cfg(not(unix))]
    fn send_kill(&self, handle: &mut ProcessHandle) {
        if let Err(e) = handle.child.start_kill() {
            warn!("Force kill failed for {} (PID: {}): {}", self.name, handle.pid, e);
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            warn!("Cleaning up {} in Drop (PID: {})", self.name, handle.pid);
            let _ = handle.child.start_kill();
        }
    }
}

fn open_log_file(path: &std::path::Path) -> Result<(Stdio, Stdio), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory {}: {}", parent.display(), e))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;
    let clone = file
        .try_clone()
        .map_err(|e| format!("Failed to clone log file: {}", e))?;
    Ok((Stdio::from(file), Stdio::from(clone)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_times_out_within_one_interval() {
        let pairs = [
            (Duration::from_millis(100), Duration::from_millis(10)),
            (Duration::from_secs(5), Duration::from_millis(500)),
            (Duration::from_secs(1), Duration::from_millis(300)),
            (Duration::from_millis(250), Duration::from_millis(249)),
        ];

        for (timeout_dur, poll) in pairs {
            let mut supervisor = ProcessSupervisor::new("probe-only");
            let result = supervisor.wait_ready(|| async { false }, timeout_dur, poll).await;

            match result {
                Readiness::TimedOut { elapsed, attempts } => {
                    assert!(elapsed >= timeout_dur, "{:?} < {:?}", elapsed, timeout_dur);
                    assert!(elapsed <= timeout_dur + poll, "{:?} > {:?}", elapsed, timeout_dur + poll);
                    assert!(attempts >= 1);
                }
                other => panic!("expected TimedOut, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_succeeds_after_failures() {
        let mut supervisor = ProcessSupervisor::new("flaky");
        let mut calls = 0;
        let result = supervisor
            .wait_ready(
                || {
                    calls += 1;
                    let ready = calls >= 3;
                    async move { ready }
                },
                Duration::from_secs(10),
                Duration::from_millis(100),
            )
            .await;

        match result {
            Readiness::Ready { elapsed, attempts } => {
                assert_eq!(attempts, 3);
                assert!(elapsed >= Duration::from_millis(200));
                assert!(elapsed < Duration::from_millis(300));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_is_cut_off_at_timeout() {
        let mut supervisor = ProcessSupervisor::new("hung");
        let result = supervisor
            .wait_ready(
                || async {
                    sleep(Duration::from_secs(3600)).await;
                    true
                },
                Duration::from_secs(2),
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Readiness::TimedOut { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_stop_without_process_is_noop() {
        let mut supervisor = ProcessSupervisor::new("idle");
        assert_eq!(
            supervisor.stop(Duration::from_millis(100)).await.unwrap(),
            StopOutcome::AlreadyStopped
        );
        assert_eq!(
            supervisor.stop(Duration::from_millis(100)).await.unwrap(),
            StopOutcome::AlreadyStopped
        );
    }

    #[tokio::test]
    async fn test_start_missing_program_fails() {
        let mut supervisor = ProcessSupervisor::new("ghost");
        let err = supervisor
            .start(&CommandSpec::new("no-such-binary-91d2"))
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert!(supervisor.handle().is_none());
    }
}
