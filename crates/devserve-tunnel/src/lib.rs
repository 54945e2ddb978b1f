//! # devserve-tunnel
//!
//! Optional public exposure of a local port through an ngrok-style tunnel
//! binary. Strictly best-effort: a missing binary disables the feature
//! silently, and URL discovery is bounded by a short window so startup is
//! never blocked past it. A spawned tunnel whose URL was never discovered
//! still counts as started and must be torn down at shutdown.

use devserve_process::ManagedProcess;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BINARY: &str = "ngrok";
const DISCOVERY_WINDOW: Duration = Duration::from_secs(10);
const DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);
const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// One public-exposure session.
///
/// `process` is `None` when the tunnel binary was not found; `public_url`
/// stays `None` when discovery did not complete within the window.
pub struct Tunnel {
    pub process: Option<ManagedProcess>,
    pub public_url: Option<String>,
}

impl Tunnel {
    /// A disabled tunnel: nothing spawned, nothing to tear down.
    pub fn disabled() -> Self {
        Self {
            process: None,
            public_url: None,
        }
    }
}

/// Status API document: a collection of tunnel records, first record wins.
#[derive(Debug, Deserialize)]
struct TunnelStatusDocument {
    #[serde(default)]
    tunnels: Vec<TunnelRecord>,
}

#[derive(Debug, Deserialize)]
struct TunnelRecord {
    public_url: Option<String>,
}

/// Spawns the tunnel binary and discovers the assigned public URL via its
/// local status API.
pub struct TunnelManager {
    binary: String,
    status_url: String,
    discovery_window: Duration,
    discovery_interval: Duration,
}

impl TunnelManager {
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            status_url: status_url.into(),
            discovery_window: DISCOVERY_WINDOW,
            discovery_interval: DISCOVERY_INTERVAL,
        }
    }

    /// Override the tunnel binary name (used by tests).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the discovery window (used by tests).
    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Start a tunnel for `local_port`. Never fails the caller.
    ///
    /// Returns immediately with a disabled [`Tunnel`] when the binary is not
    /// on PATH. Otherwise spawns it and polls the status API until a public
    /// URL shows up or the discovery window expires.
    pub async fn start(&self, local_port: u16) -> Tunnel {
        let binary_path = match which::which(&self.binary) {
            Ok(path) => path,
            Err(_) => {
                info!(
                    "{} binary not found in PATH; skipping tunnel startup",
                    self.binary
                );
                return Tunnel::disabled();
            }
        };

        let command = vec![
            binary_path.to_string_lossy().into_owned(),
            "http".to_string(),
            local_port.to_string(),
            "--log=stdout".to_string(),
        ];

        let process = match ManagedProcess::spawn(&self.binary, &command, &HashMap::new()) {
            Ok(process) => process,
            Err(e) => {
                warn!("Failed to start tunnel process: {}", e);
                return Tunnel::disabled();
            }
        };

        let public_url = self.discover_public_url().await;
        match &public_url {
            Some(url) => info!("Tunnel public URL: {}", url),
            None => info!(
                "Tunnel started but public URL not available yet (check the local dashboard at {})",
                self.status_url
            ),
        }

        Tunnel {
            process: Some(process),
            public_url,
        }
    }

    /// Poll the local status API until the first tunnel record advertises a
    /// public URL, bounded by the discovery window.
    async fn discover_public_url(&self) -> Option<String> {
        let deadline = Instant::now() + self.discovery_window;

        loop {
            if let Some(url) = self.query_status_api().await {
                return Some(url);
            }
            if Instant::now() + self.discovery_interval >= deadline {
                return None;
            }
            sleep(self.discovery_interval).await;
        }
    }

    async fn query_status_api(&self) -> Option<String> {
        let uri: Uri = match self.status_url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Invalid tunnel status URL {}: {}", self.status_url, e);
                return None;
            }
        };

        let client = Client::builder(TokioExecutor::new()).build_http();
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .ok()?;

        let response = match timeout(STATUS_REQUEST_TIMEOUT, client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("Tunnel status API not reachable: {}", e);
                return None;
            }
            Err(_) => {
                debug!("Tunnel status API request timed out");
                return None;
            }
        };

        let body = response.into_body().collect().await.ok()?.to_bytes();
        let document: TunnelStatusDocument = match serde_json::from_slice(&body) {
            Ok(document) => document,
            Err(e) => {
                debug!("Failed to parse tunnel status document: {}", e);
                return None;
            }
        };

        document
            .tunnels
            .into_iter()
            .next()
            .and_then(|record| record.public_url)
    }
}
