//! Process existence checking.

use testrig_common::SupervisorResult;

/// Check if a process with the given PID exists.
///
/// On Unix this uses `kill(pid, 0)`, which delivers no signal but reports
/// whether the PID is known to the kernel. A zombie still counts as existing
/// until it has been reaped.
///
/// * `Ok(true)` - Process exists (possibly owned by another user)
/// * `Ok(false)` - No such process
/// * `Err(_)` - The check itself failed
pub fn process_exists(pid: u32) -> SupervisorResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(not(unix))]
    {
        Err(testrig_common::SupervisorError::signal_failed(
            pid.to_string(),
            "process existence check is only supported on Unix",
        ))
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> SupervisorResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let nix_pid = Pid::from_raw(pid as i32);

    match kill(nix_pid, None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(testrig_common::SupervisorError::signal_failed(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        assert!(process_exists(std::process::id()).unwrap());
    }

    #[test]
    fn test_reaped_child_does_not_exist() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!process_exists(pid).unwrap());
    }
}
