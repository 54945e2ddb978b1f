use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use devserve_config::SupervisorConfig;
use devserve_orchestrator::Orchestrator;

/// devserve - local development supervisor
///
/// Reclaims the backend port, starts the backend, waits for it to report
/// healthy, optionally exposes it through a tunnel, and serves the static
/// frontend until interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Env file with KEY=VALUE overrides (never overrides real environment)
    #[arg(long, value_name = "FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Frontend port (overrides PORT/STATIC_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend port (overrides BACKEND_PORT)
    #[arg(long)]
    backend_port: Option<u16>,

    /// Directory to serve the static frontend from (overrides STATIC_ROOT)
    #[arg(long, value_name = "DIR")]
    static_root: Option<PathBuf>,

    /// Do not attempt to start a tunnel
    #[arg(long)]
    no_tunnel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting devserve supervisor");

    let mut config = SupervisorConfig::load(Some(&args.env_file))?;

    // CLI flags beat environment, environment beats the env file
    if let Some(port) = args.port {
        config.frontend_port = port;
    }
    if let Some(backend_port) = args.backend_port {
        config.backend_port = backend_port;
        // Keep the default tunnel target in sync with the override
        if config.tunnel_port != backend_port && std::env::var("TUNNEL_PORT").is_err() {
            config.tunnel_port = backend_port;
        }
    }
    if let Some(static_root) = args.static_root {
        config.static_root = static_root;
    }
    if args.no_tunnel {
        config.tunnel_enabled = false;
    }

    info!(
        "Backend on port {}, frontend on port {}, serving {}",
        config.backend_port,
        config.frontend_port,
        config.static_root.display()
    );

    let mut orchestrator = Orchestrator::new(config);
    orchestrator
        .run(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Fatal error in supervisor: {}", e))?;

    info!("Supervisor terminated cleanly");
    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}

/// Resolves when the first interruption signal arrives. A second signal
/// during teardown is not wired to anything, so shutdown runs exactly once.
async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C signal");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
