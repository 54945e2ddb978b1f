//! Static frontend serving.
//!
//! The file handling itself is a library capability (`tower_http::ServeDir`
//! handles content types and ranges); this module only owns the bind and the
//! blocking accept loop, which runs until the shutdown future resolves.

use axum::Router;
use devserve_common::{SupervisorError, SupervisorResult};
use std::future::Future;
use std::path::Path;
use tower_http::services::ServeDir;
use tracing::info;

/// Serve `root` on `port` until `shutdown` resolves.
///
/// This is the final, deliberately unbounded wait of a run; every other wait
/// in the system has an explicit timeout.
pub async fn serve_frontend(
    port: u16,
    root: &Path,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> SupervisorResult<()> {
    let app = Router::new().fallback_service(ServeDir::new(root));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| SupervisorError::Frontend(format!("failed to bind port {}: {}", port, e)))?;

    let local_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(port);
    info!(
        "Serving static site at http://localhost:{} (CTRL+C to stop)",
        local_port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SupervisorError::Frontend(e.to_string()))
}
