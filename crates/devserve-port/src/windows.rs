//! Windows port reclamation via `netstat -ano` and `taskkill`.

use crate::{filter_killable_pids, PortReclaimer};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Reclaims ports by parsing `netstat -ano` for TCP listeners on the target
/// port and killing each owning PID with `taskkill /F`.
pub struct WindowsPortReclaimer;

#[async_trait]
impl PortReclaimer for WindowsPortReclaimer {
    async fn reclaim(&self, port: u16) -> usize {
        info!("Checking for processes listening on port {}...", port);

        let output = match Command::new("netstat").arg("-ano").output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run netstat for port {}: {}", port, e);
                return 0;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pids = filter_killable_pids(parse_netstat_pids(&stdout, port));

        if pids.is_empty() {
            info!("No non-system processes found listening on port {}", port);
            return 0;
        }

        let mut killed = 0;
        for pid in pids {
            info!("Killing PID {} listening on port {}", pid, port);
            match Command::new("taskkill")
                .args(["/F", "/PID", &pid.to_string()])
                .output()
                .await
            {
                Ok(result) if result.status.success() => killed += 1,
                Ok(result) => warn!(
                    "Failed to kill PID {}: {}",
                    pid,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
                Err(e) => warn!("Failed to kill PID {}: {}", pid, e),
            }
        }
        killed
    }
}

/// Extract owning PIDs of TCP sockets whose local address ends in `:{port}`.
///
/// Netstat rows look like:
/// `  TCP    0.0.0.0:3000    0.0.0.0:0    LISTENING    4321`
fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 || !parts[0].to_lowercase().starts_with("tcp") {
                return None;
            }
            let local = parts[1];
            if !local.ends_with(&suffix) {
                return None;
            }
            parts.last()?.parse::<u32>().ok()
        })
        .collect()
}
