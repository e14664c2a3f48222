//! Fleet v1 API client over a unix domain socket.
//!
//! Every request opens a fresh connection to the socket (fleet closes
//! idle connections aggressively), sends one HTTP/1 request and decodes
//! the JSON body.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use nodereg_core::{Member, RegisterError, RegisterResult};

use crate::source::MembershipSource;

/// Client-side bound on every fleet request.
pub const DEFAULT_FLEET_TIMEOUT: Duration = Duration::from_secs(10);

const MACHINES_PATH: &str = "/fleet/v1/machines";

/// Upper bound on the pages followed by one machine listing.
const MAX_MACHINE_PAGES: usize = 1000;

/// One page of `GET /fleet/v1/machines`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachinePage {
    #[serde(default)]
    machines: Vec<MachineEntity>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MachineEntity {
    #[serde(default)]
    id: String,
    #[serde(rename = "primaryIP", default)]
    primary_ip: String,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

impl From<MachineEntity> for Member {
    fn from(machine: MachineEntity) -> Self {
        Member {
            name: machine.primary_ip,
            metadata: machine.metadata.unwrap_or_default(),
        }
    }
}

/// Turn a `unix://` endpoint into a socket path.
///
/// Both `unix:///var/run/fleet.sock` and `unix://var/run/fleet.sock`
/// address `/var/run/fleet.sock`.
pub fn parse_socket_endpoint(endpoint: &str) -> RegisterResult<PathBuf> {
    let rest = endpoint.strip_prefix("unix://").ok_or_else(|| {
        RegisterError::Config(format!(
            "the fleet endpoint '{endpoint}' should be a unix socket (unix://<path>)"
        ))
    })?;
    if rest.trim_matches('/').is_empty() {
        return Err(RegisterError::Config(format!(
            "the fleet endpoint '{endpoint}' has no socket path"
        )));
    }
    if rest.starts_with('/') {
        Ok(PathBuf::from(rest))
    } else {
        Ok(PathBuf::from(format!("/{rest}")))
    }
}

/// Membership source backed by the fleet API socket.
#[derive(Debug, Clone)]
pub struct FleetClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl FleetClient {
    /// Create a client for a `unix://` endpoint.
    pub fn new(endpoint: &str) -> RegisterResult<Self> {
        let socket_path = parse_socket_endpoint(endpoint)?;
        debug!(socket = %socket_path.display(), "creating fleet client");
        Ok(Self::with_socket(socket_path))
    }

    pub fn with_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_FLEET_TIMEOUT,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> RegisterResult<T> {
        let request = async {
            let stream = tokio::net::UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| {
                    transport(format!(
                        "unable to connect to fleet socket {}: {e}",
                        self.socket_path.display()
                    ))
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| transport(format!("fleet handshake failed: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    trace!(error = %e, "fleet connection closed with error");
                }
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(path_and_query)
                .header("host", "domain-sock")
                .header("user-agent", concat!("node-register/", env!("CARGO_PKG_VERSION")))
                .header("connection", "close")
                .body(http_body_util::Empty::<bytes::Bytes>::new())
                .map_err(|e| transport(format!("invalid fleet request {path_and_query}: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| transport(format!("fleet request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| transport(format!("unable to read fleet response: {e}")))?
                .to_bytes();

            if !status.is_success() {
                return Err(transport(format!(
                    "fleet returned {status}: {}",
                    String::from_utf8_lossy(&body).trim()
                )));
            }

            serde_json::from_slice(&body)
                .map_err(|e| transport(format!("unable to decode fleet response: {e}")))
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| transport(format!("fleet request {path_and_query} timed out")))?
    }
}

#[async_trait]
impl MembershipSource for FleetClient {
    async fn list_members(&self) -> RegisterResult<Vec<Member>> {
        trace!("retrieving the list of machines in the fleet cluster");
        let mut members = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for _ in 0..MAX_MACHINE_PAGES {
            let path = match &page_token {
                Some(token) => format!("{MACHINES_PATH}?nextPageToken={token}"),
                None => MACHINES_PATH.to_string(),
            };
            let page: MachinePage = self.get_json(&path).await?;

            for machine in page.machines {
                trace!(id = %machine.id, address = %machine.primary_ip, "adding fleet machine");
                members.push(Member::from(machine));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(transport(format!(
                            "fleet returned the page token '{token}' twice"
                        )));
                    }
                    page_token = Some(token);
                }
                _ => {
                    debug!(count = members.len(), "found machines in the fleet cluster");
                    return Ok(members);
                }
            }
        }

        Err(transport(format!(
            "fleet machine listing exceeded {MAX_MACHINE_PAGES} pages"
        )))
    }
}

fn transport(msg: String) -> RegisterError {
    RegisterError::Transport(msg)
}
