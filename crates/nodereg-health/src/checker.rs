//! Health check probe logic.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Path every kubelet serves its health check on.
pub const DEFAULT_HEALTH_PATH: &str = "/healthz";

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint returned a status in `[200, 400)`.
    Healthy,
    /// The health endpoint answered with any other status.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// Decides whether a member is healthy enough to register.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, hostname: &str) -> bool;
}

/// Probes `http://{hostname}:{port}{path}`.
#[derive(Debug, Clone)]
pub struct HttpProber {
    port: u16,
    path: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            path: DEFAULT_HEALTH_PATH.to_string(),
            timeout,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn is_healthy(&self, hostname: &str) -> bool {
        debug!(%hostname, port = self.port, "checking member health");
        let result = http_probe(hostname, self.port, &self.path, self.timeout).await;
        debug!(%hostname, ?result, "health probe finished");
        result.is_healthy()
    }
}

/// Perform an HTTP health probe against `host:port`.
///
/// Returns `Healthy` for a status in `[200, 400)`, `Unhealthy` for any
/// other status, or `Failed` if the connection fails or times out.
pub async fn http_probe(host: &str, port: u16, path: &str, timeout: Duration) -> ProbeResult {
    let authority = format!("{host}:{port}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect((host, port)).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %authority, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %authority, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", authority.as_str())
            .header("user-agent", concat!("node-register/", env!("CARGO_PKG_VERSION")))
            .header("connection", "close")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %authority, %path, "invalid health probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() || status.is_redirection() {
                    ProbeResult::Healthy
                } else {
                    debug!(%status, %authority, "health probe returned failure status");
                    ProbeResult::Unhealthy
                }
            }
            Err(e) => {
                debug!(error = %e, %authority, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%authority, "health probe timed out");
            ProbeResult::Failed
        }
    }
}
