//! Lifecycle scenarios against real subprocesses.

#![cfg(unix)]

use std::time::Duration;
use testrig_common::SupervisorError;
use testrig_process::process_exists;
use testrig_supervisor::{CommandSpec, ProcessSupervisor, Readiness, StopOutcome};

#[tokio::test]
async fn test_start_ready_stop_twice() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs").join("service.log");

    let mut supervisor = ProcessSupervisor::new("service");
    let spec = CommandSpec::new("sh")
        .args(["-c", "echo listening; exec sleep 30"])
        .working_dir(dir.path())
        .log_file(&log);

    let pid = supervisor.start(&spec).await.unwrap().pid();
    assert!(supervisor.is_running());
    assert_eq!(supervisor.handle().unwrap().working_dir(), Some(dir.path()));

    let log_probe = log.clone();
    let readiness = supervisor
        .wait_ready(
            move || {
                let log = log_probe.clone();
                async move {
                    tokio::fs::read_to_string(&log)
                        .await
                        .map(|content| content.contains("listening"))
                        .unwrap_or(false)
                }
            },
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
    assert!(readiness.is_ready(), "{:?}", readiness);

    let first = supervisor.stop(Duration::from_secs(2)).await.unwrap();
    assert!(matches!(first, StopOutcome::Exited { forced: false, .. }));
    assert!(!process_exists(pid).unwrap());

    let second = supervisor.stop(Duration::from_secs(2)).await.unwrap();
    assert_eq!(second, StopOutcome::AlreadyStopped);
    assert!(!process_exists(pid).unwrap());
}

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let mut supervisor = ProcessSupervisor::new("stubborn");
    let spec = CommandSpec::new("sh").args(["-c", "trap '' TERM; while true; do sleep 0.1; done"]);
    let pid = supervisor.start(&spec).await.unwrap().pid();

    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let outcome = supervisor.stop(Duration::from_millis(300)).await.unwrap();
    assert!(matches!(outcome, StopOutcome::Exited { forced: true, .. }));
    assert!(!process_exists(pid).unwrap());
}

#[tokio::test]
async fn test_second_start_rejected_while_running() {
    let mut supervisor = ProcessSupervisor::new("single");
    let spec = CommandSpec::new("sleep").args(["30"]);
    supervisor.start(&spec).await.unwrap();

    let err = supervisor.start(&spec).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));

    supervisor.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_exit_before_ready_is_reported() {
    let mut supervisor = ProcessSupervisor::new("crasher");
    supervisor
        .start(&CommandSpec::new("sh").args(["-c", "exit 7"]))
        .await
        .unwrap();

    let readiness = supervisor
        .wait_ready(|| async { false }, Duration::from_secs(10), Duration::from_millis(50))
        .await;

    match readiness {
        Readiness::Exited { exit_code, elapsed } => {
            assert_eq!(exit_code, Some(7));
            assert!(elapsed < Duration::from_secs(10));
        }
        other => panic!("expected Exited, got {:?}", other),
    }

    // The exited process is reaped; stop still succeeds.
    assert!(matches!(
        supervisor.stop(Duration::from_millis(100)).await.unwrap(),
        StopOutcome::Exited { forced: false, .. }
    ));
}
