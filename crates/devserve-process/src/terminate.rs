//! Cross-platform process termination primitives.

use devserve_common::{SupervisorError, SupervisorResult};

/// Terminate a process gracefully (SIGTERM on Unix).
///
/// On Windows there is no signal equivalent a console-less child will honor,
/// so graceful and forced termination both go through `TerminateProcess`.
pub fn terminate_gracefully(pid: u32) -> SupervisorResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);
        kill(nix_pid, Signal::SIGTERM)
            .map_err(|e| SupervisorError::stop_failed(pid.to_string(), e.to_string()))
    }

    #[cfg(windows)]
    {
        force_kill(pid)
    }
}

/// Force kill a process (SIGKILL on Unix, TerminateProcess on Windows).
pub fn force_kill(pid: u32) -> SupervisorResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);
        kill(nix_pid, Signal::SIGKILL)
            .map_err(|e| SupervisorError::stop_failed(pid.to_string(), e.to_string()))
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    return Err(SupervisorError::stop_failed(
                        pid.to_string(),
                        "Failed to open process for termination".to_string(),
                    ));
                }
            };

            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            result.map_err(|e| {
                SupervisorError::stop_failed(
                    pid.to_string(),
                    format!("TerminateProcess failed: {}", e),
                )
            })
        }
    }
}

/// Check if a process with the given PID exists and is running.
///
/// Non-destructive: `kill(pid, 0)` on Unix, `OpenProcess` on Windows.
pub fn process_exists(pid: u32) -> SupervisorResult<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);
        match kill(nix_pid, None) {
            Ok(_) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            // Process exists but we don't have permission to signal it
            Err(nix::errno::Errno::EPERM) => Ok(true),
            Err(e) => Err(SupervisorError::stop_failed(
                pid.to_string(),
                format!("Failed to check process: {}", e),
            )),
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

        unsafe {
            let handle: HANDLE = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
                Ok(h) => h,
                Err(e) => {
                    let error_code = e.code().0 as u32;
                    const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
                    const ERROR_ACCESS_DENIED: u32 = 0x80070005;

                    if error_code == ERROR_INVALID_PARAMETER || error_code == ERROR_ACCESS_DENIED {
                        return Ok(false);
                    }
                    return Err(SupervisorError::stop_failed(
                        pid.to_string(),
                        format!("Failed to check process: {}", e),
                    ));
                }
            };

            let _ = CloseHandle(handle);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        let current_pid = std::process::id();
        assert!(process_exists(current_pid).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn test_nonexistent_process() {
        // PIDs this high are effectively never allocated
        let exists = process_exists(9_999_999).unwrap();
        assert!(!exists);
    }
}
