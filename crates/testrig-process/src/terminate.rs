//! Process termination primitives.
//!
//! Graceful termination is SIGTERM; forced termination is SIGKILL. A process
//! that has already exited is not an error for either call.

use testrig_common::{SupervisorError, SupervisorResult};

/// Ask a process to terminate (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> SupervisorResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        Err(SupervisorError::signal_failed(
            pid.to_string(),
            "graceful termination is only supported on Unix",
        ))
    }
}

/// Force kill a process (SIGKILL).
pub fn force_kill(pid: u32) -> SupervisorResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        Err(SupervisorError::signal_failed(
            pid.to_string(),
            "force kill by PID is only supported on Unix",
        ))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> SupervisorResult<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        // Already gone.
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(SupervisorError::signal_failed(
            pid.to_string(),
            format!("{:?}: {}", signal, e),
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_terminate_running_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();

        terminate_gracefully(child.id()).unwrap();
        let status = child.wait().unwrap();

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc_sigterm()));
    }

    #[test]
    fn test_signal_to_missing_process_is_ok() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        assert!(force_kill(pid).is_ok());
    }

    fn libc_sigterm() -> i32 {
        nix::sys::signal::Signal::SIGTERM as i32
    }
}
