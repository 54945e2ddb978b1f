//! Unix port reclamation via `lsof`, falling back to `fuser`.

use crate::{filter_killable_pids, PortReclaimer};
use async_trait::async_trait;
use devserve_process::force_kill;
use tokio::process::Command;
use tracing::{info, warn};

/// Reclaims ports by enumerating listener PIDs with `lsof -ti tcp:{port}`
/// and force killing each one. When `lsof` is unavailable, falls back to
/// `fuser -k {port}/tcp`; when neither tool exists, warns and does nothing.
pub struct UnixPortReclaimer;

#[async_trait]
impl PortReclaimer for UnixPortReclaimer {
    async fn reclaim(&self, port: u16) -> usize {
        info!("Checking for processes listening on port {}...", port);

        if which::which("lsof").is_ok() {
            return reclaim_with_lsof(port).await;
        }

        if which::which("fuser").is_ok() {
            return reclaim_with_fuser(port).await;
        }

        warn!(
            "Neither lsof nor fuser found; skipping reclamation of port {}",
            port
        );
        0
    }
}

async fn reclaim_with_lsof(port: u16) -> usize {
    let output = match Command::new("lsof")
        .arg("-ti")
        .arg(format!("tcp:{}", port))
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run lsof for port {}: {}", port, e);
            return 0;
        }
    };

    // lsof exits non-zero when nothing matches; that is the zero-effect
    // success case, not a failure
    let stdout = String::from_utf8_lossy(&output.stdout);
    let pids = filter_killable_pids(parse_pid_lines(&stdout));

    if pids.is_empty() {
        info!("No processes found listening on port {}", port);
        return 0;
    }

    let mut killed = 0;
    for pid in pids {
        info!("Killing PID {} listening on port {}", pid, port);
        match force_kill(pid) {
            Ok(()) => killed += 1,
            Err(e) => warn!("Failed to kill PID {}: {}", pid, e),
        }
    }
    killed
}

async fn reclaim_with_fuser(port: u16) -> usize {
    match Command::new("fuser")
        .arg("-k")
        .arg(format!("{}/tcp", port))
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            info!("fuser killed listeners on port {}", port);
            // fuser does not report how many; count the PIDs it printed
            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_pid_lines(&stdout).len().max(1)
        }
        Ok(_) => {
            info!("No processes found listening on port {}", port);
            0
        }
        Err(e) => {
            warn!("Failed to run fuser for port {}: {}", port, e);
            0
        }
    }
}

/// Parse whitespace-separated PID tokens, skipping anything non-numeric.
fn parse_pid_lines(output: &str) -> Vec<u32> {
    output
        .split_whitespace()
        .filter_map(|token| token.parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid_lines() {
        assert_eq!(parse_pid_lines("1234\n5678\n"), vec![1234, 5678]);
        assert_eq!(parse_pid_lines(""), Vec::<u32>::new());
        assert_eq!(parse_pid_lines("garbage\n42\n"), vec![42]);
    }
}
