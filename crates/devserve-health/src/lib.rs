//! # devserve-health
//!
//! Blocking HTTP health polling: probe an endpoint with a short per-attempt
//! timeout until it answers 2xx or an overall deadline elapses. A single
//! sequential loop is enough — only one target is ever polled per call.

use devserve_common::{SupervisorError, SupervisorResult};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

/// Delay between probe attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-attempt request timeout. Kept short so a hung endpoint cannot eat
/// the whole deadline in one attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// One health probe target: a URL plus a per-attempt timeout. Stateless,
/// constructed fresh per poll cycle.
#[derive(Debug, Clone)]
pub struct HealthCheckTarget {
    pub url: String,
    pub timeout: Duration,
}

impl HealthCheckTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: ATTEMPT_TIMEOUT,
        }
    }

    /// Issue one GET against the target. Any 2xx status is healthy;
    /// connection refusal, timeout, bad URL or any other status is
    /// "not yet ready".
    pub async fn probe(&self) -> bool {
        let uri: Uri = match self.url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Invalid health check URL {}: {}", self.url, e);
                return false;
            }
        };

        let client = Client::builder(TokioExecutor::new()).build_http();
        let request = match Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Empty::<Bytes>::new())
        {
            Ok(request) => request,
            Err(e) => {
                debug!("Failed to build health check request: {}", e);
                return false;
            }
        };

        match timeout(self.timeout, client.request(request)).await {
            Ok(Ok(response)) => {
                let healthy = response.status().is_success();
                debug!(
                    "Health probe {}: status={} healthy={}",
                    self.url,
                    response.status(),
                    healthy
                );
                healthy
            }
            Ok(Err(e)) => {
                debug!("Health probe {} failed: {}", self.url, e);
                false
            }
            Err(_) => {
                debug!("Health probe {} timed out", self.url);
                false
            }
        }
    }
}

/// Block until `url` answers 2xx, retrying every [`POLL_INTERVAL`], or fail
/// with [`SupervisorError::HealthTimeout`] once `overall_timeout` elapses.
///
/// The timeout variant is distinct so callers can abort the whole startup
/// sequence on it.
pub async fn wait_until_healthy(url: &str, overall_timeout: Duration) -> SupervisorResult<()> {
    let deadline = Instant::now() + overall_timeout;

    loop {
        let target = HealthCheckTarget::new(url);
        if target.probe().await {
            info!("Backend healthy at {}", url);
            return Ok(());
        }

        if Instant::now() + POLL_INTERVAL >= deadline {
            return Err(SupervisorError::health_timeout(url, overall_timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;

    async fn serve_health(ready_after: Duration) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ready_at = Arc::new(std::time::Instant::now() + ready_after);

        let app = Router::new().route(
            "/api/health",
            get(move || {
                let ready_at = Arc::clone(&ready_at);
                async move {
                    if std::time::Instant::now() >= *ready_at {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                }
            }),
        );

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://127.0.0.1:{}/api/health", addr.port())
    }

    #[tokio::test]
    async fn test_wait_succeeds_once_endpoint_turns_healthy() {
        let url = serve_health(Duration::from_secs(1)).await;
        let started = std::time::Instant::now();

        wait_until_healthy(&url, Duration::from_secs(10))
            .await
            .expect("endpoint became healthy within the deadline");

        // Must have waited through at least the 503 window
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_wait_times_out_against_unready_endpoint() {
        // Endpoint only turns healthy after 5s; a 2s budget must fail
        let url = serve_health(Duration::from_secs(5)).await;
        let started = std::time::Instant::now();

        let result = wait_until_healthy(&url, Duration::from_secs(2)).await;
        match result {
            Err(SupervisorError::HealthTimeout { timeout, .. }) => {
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("expected HealthTimeout, got {:?}", other.map(|_| ())),
        }

        // The loop must respect the deadline, not overshoot it wildly
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_wait_times_out_against_connection_refused() {
        // Grab a free port, then drop the listener so nothing answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{}/api/health", port);
        let result = wait_until_healthy(&url, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(SupervisorError::HealthTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_rejects_bad_url() {
        let target = HealthCheckTarget::new("not a url");
        assert!(!target.probe().await);
    }
}
