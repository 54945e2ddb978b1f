//! # devserve-orchestrator
//!
//! Sequences the full supervisor run: reclaim the backend port, start the
//! backend, gate on its health endpoint, optionally expose it through a
//! tunnel, serve the static frontend until interrupted, then tear everything
//! down in reverse order.
//!
//! One sequential control task drives the stage machine; the only concurrency
//! in the system is the per-process output drainers, which never make control
//! decisions.

pub mod frontend;

use devserve_common::{SupervisorError, SupervisorResult};
use devserve_config::SupervisorConfig;
use devserve_health::wait_until_healthy;
use devserve_port::{platform_reclaimer, PortReclaimer};
use devserve_process::ManagedProcess;
use devserve_tunnel::{Tunnel, TunnelManager};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Grace period given to each supervised process at teardown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const BACKEND_PROCESS: &str = "backend";
const TUNNEL_PROCESS: &str = "tunnel";

/// Stages of a supervisor run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    ReclaimingPort,
    StartingBackend,
    WaitingHealthy,
    StartingTunnel,
    ServingFrontend,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::Init => write!(f, "init"),
            RunStage::ReclaimingPort => write!(f, "reclaiming_port"),
            RunStage::StartingBackend => write!(f, "starting_backend"),
            RunStage::WaitingHealthy => write!(f, "waiting_healthy"),
            RunStage::StartingTunnel => write!(f, "starting_tunnel"),
            RunStage::ServingFrontend => write!(f, "serving_frontend"),
            RunStage::ShuttingDown => write!(f, "shutting_down"),
            RunStage::Terminated => write!(f, "terminated"),
        }
    }
}

/// Drives one supervisor run end to end.
///
/// Owns at most one backend and one tunnel process at a time, and is the
/// only actor permitted to request their termination. The backend port is
/// always reclaimed before the backend is spawned, so two processes can
/// never end up bound to it.
pub struct Orchestrator {
    config: SupervisorConfig,
    reclaimer: Box<dyn PortReclaimer>,
    tunnel_manager: TunnelManager,
    backend: Option<ManagedProcess>,
    tunnel: Tunnel,
    stage: RunStage,
    stage_history: Vec<RunStage>,
    teardown_order: Vec<&'static str>,
}

impl Orchestrator {
    pub fn new(config: SupervisorConfig) -> Self {
        let tunnel_manager = TunnelManager::new(config.tunnel_status_url.clone());
        Self {
            config,
            reclaimer: platform_reclaimer(),
            tunnel_manager,
            backend: None,
            tunnel: Tunnel::disabled(),
            stage: RunStage::Init,
            stage_history: vec![RunStage::Init],
            teardown_order: Vec::new(),
        }
    }

    /// Replace the tunnel manager (tests inject a fake binary and a short
    /// discovery window).
    pub fn with_tunnel_manager(mut self, tunnel_manager: TunnelManager) -> Self {
        self.tunnel_manager = tunnel_manager;
        self
    }

    /// Replace the port reclamation strategy (tests inject a no-op so the
    /// reclaimer cannot touch listeners owned by the test process).
    pub fn with_reclaimer(mut self, reclaimer: Box<dyn PortReclaimer>) -> Self {
        self.reclaimer = reclaimer;
        self
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    /// Every stage entered so far, in order.
    pub fn stage_history(&self) -> &[RunStage] {
        &self.stage_history
    }

    /// Names of supervised processes in the order they were stopped.
    pub fn teardown_order(&self) -> &[&'static str] {
        &self.teardown_order
    }

    /// Run the full protocol. `shutdown` interrupts the frontend accept
    /// loop; teardown always runs, whether startup failed or serving was
    /// interrupted.
    ///
    /// Returns `Err` only for fatal startup conditions (backend spawn
    /// failure, health gate timeout, frontend bind failure); an interrupted
    /// normal run returns `Ok`.
    pub async fn run(
        &mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> SupervisorResult<()> {
        let result = self.startup_and_serve(shutdown).await;

        if let Err(e) = &result {
            error!("Fatal error during startup: {}", e);
        } else {
            info!("Shutting down...");
        }

        self.shutdown().await;
        result
    }

    async fn startup_and_serve(
        &mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> SupervisorResult<()> {
        self.enter(RunStage::ReclaimingPort);
        self.reclaimer.reclaim(self.config.backend_port).await;

        self.enter(RunStage::StartingBackend);
        let mut env_overrides = HashMap::new();
        // The backend must bind the port the health gate and tunnel expect
        env_overrides.insert("PORT".to_string(), self.config.backend_port.to_string());
        let backend =
            ManagedProcess::spawn(BACKEND_PROCESS, &self.config.backend_command, &env_overrides)?;
        self.backend = Some(backend);

        self.enter(RunStage::WaitingHealthy);
        wait_until_healthy(&self.config.health_url(), self.config.health_timeout).await?;

        if self.config.tunnel_enabled {
            self.enter(RunStage::StartingTunnel);
            self.tunnel = self.tunnel_manager.start(self.config.tunnel_port).await;
            if let Some(url) = &self.tunnel.public_url {
                info!("Public backend (tunnel) -> {}/", url);
            }
        }

        self.enter(RunStage::ServingFrontend);
        frontend::serve_frontend(
            self.config.frontend_port,
            &self.config.static_root,
            shutdown,
        )
        .await
    }

    /// Stop the tunnel, then the backend, each with a bounded grace period.
    /// Individual failures are logged and swallowed so every owned process
    /// gets a termination attempt. Idempotent: re-entry is a no-op.
    async fn shutdown(&mut self) {
        if matches!(self.stage, RunStage::ShuttingDown | RunStage::Terminated) {
            return;
        }
        self.enter(RunStage::ShuttingDown);

        if let Some(mut tunnel_process) = self.tunnel.process.take() {
            self.teardown_order.push(TUNNEL_PROCESS);
            match tunnel_process.stop(SHUTDOWN_GRACE).await {
                Ok(()) => info!("Tunnel stopped."),
                Err(e) => warn!("Error stopping tunnel: {}", e),
            }
        }

        if let Some(mut backend) = self.backend.take() {
            self.teardown_order.push(BACKEND_PROCESS);
            match backend.stop(SHUTDOWN_GRACE).await {
                Ok(()) => info!("Backend stopped."),
                Err(e) => warn!("Error stopping backend: {}", e),
            }
        }

        self.enter(RunStage::Terminated);
    }

    fn enter(&mut self, stage: RunStage) {
        info!("Supervisor stage: {} -> {}", self.stage, stage);
        self.stage = stage;
        self.stage_history.push(stage);
    }
}
