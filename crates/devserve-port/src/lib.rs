//! # devserve-port
//!
//! Best-effort reclamation of a TCP port held by a stale process.
//!
//! The strategy is platform-specific and selected once at startup via
//! [`platform_reclaimer`]. Reclamation never fails the caller: enumeration
//! failures, missing platform tools and individual kill failures are logged
//! and skipped. Finding nothing to kill is success with zero effect.

use async_trait::async_trait;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixPortReclaimer;
#[cfg(windows)]
pub use windows::WindowsPortReclaimer;

/// PIDs at or below this value belong to the platform (idle/system
/// processes) and are never killed.
pub(crate) const RESERVED_PID_THRESHOLD: u32 = 4;

/// Platform capability: terminate every process listening on a TCP port.
#[async_trait]
pub trait PortReclaimer: Send + Sync {
    /// Best-effort terminate all listeners on `port`, excluding system
    /// processes. Returns the number of processes that were killed.
    async fn reclaim(&self, port: u16) -> usize;
}

/// Select the reclamation strategy for the current platform.
pub fn platform_reclaimer() -> Box<dyn PortReclaimer> {
    #[cfg(unix)]
    {
        Box::new(UnixPortReclaimer)
    }

    #[cfg(windows)]
    {
        Box::new(WindowsPortReclaimer)
    }
}

/// Drop PIDs that belong to the platform or could not be parsed.
pub(crate) fn filter_killable_pids(pids: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut killable: Vec<u32> = pids
        .into_iter()
        .filter(|&pid| pid > RESERVED_PID_THRESHOLD)
        .collect();
    killable.sort_unstable();
    killable.dedup();
    killable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_pids_are_filtered() {
        let pids = vec![0, 1, 4, 5, 1234, 1234];
        assert_eq!(filter_killable_pids(pids), vec![5, 1234]);
    }

    #[tokio::test]
    async fn test_unbound_port_is_a_noop() {
        // Nothing listens on this port; reclaim must succeed with zero kills.
        let reclaimer = platform_reclaimer();
        let killed = reclaimer.reclaim(59_999).await;
        assert_eq!(killed, 0);
    }
}
