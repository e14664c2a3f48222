//! Kubernetes-backed registry client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Config};
use tracing::{debug, info, trace};

use nodereg_core::{RegisterError, RegisterResult, RegistryEntry};

use crate::convert::{entry_from_node, node_for};
use crate::registry::NodeRegistry;

/// Client-side bound on reads from the API server.
const API_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach and authenticate against the Kubernetes API.
#[derive(Debug, Clone, Default)]
pub struct KubeSettings {
    /// API server URL, e.g. `https://127.0.0.1:6443`.
    pub api: String,
    /// Literal bearer token.
    pub token: Option<String>,
    /// File holding the bearer token; takes precedence over `token`.
    pub token_file: Option<PathBuf>,
    /// PEM bundle of the CA that signed the API server certificate.
    pub ca_cert: Option<PathBuf>,
    /// Skip server certificate verification. Ignored when `ca_cert` is set.
    pub insecure: bool,
}

impl KubeSettings {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            ..Default::default()
        }
    }

    /// Translate into a kube client configuration.
    pub fn to_config(&self) -> RegisterResult<Config> {
        let uri: http::Uri = self.api.parse().map_err(|e| {
            RegisterError::Config(format!("invalid kubernetes api url {}: {e}", self.api))
        })?;

        let mut config = Config::new(uri);
        config.read_timeout = Some(API_READ_TIMEOUT);
        config.accept_invalid_certs = self.insecure;

        if let Some(path) = &self.token_file {
            debug!(path = %path.display(), "using kubernetes token file");
            let token = std::fs::read_to_string(path).map_err(|e| {
                RegisterError::Config(format!(
                    "unable to read the token file {}: {e}",
                    path.display()
                ))
            })?;
            config.auth_info.token = Some(token.trim().to_string().into());
        } else if let Some(token) = &self.token {
            config.auth_info.token = Some(token.clone().into());
        }

        if let Some(path) = &self.ca_cert {
            config.accept_invalid_certs = false;
            config.root_cert = Some(load_ca_bundle(path)?);
        }

        Ok(config)
    }
}

/// Read every certificate from a PEM file as DER.
pub fn load_ca_bundle(path: &Path) -> RegisterResult<Vec<Vec<u8>>> {
    let pem = std::fs::read(path).map_err(|e| {
        RegisterError::Config(format!("unable to read the cert file {}: {e}", path.display()))
    })?;
    let mut reader = std::io::BufReader::new(pem.as_slice());
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|c| c.map(|der| der.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            RegisterError::Config(format!("invalid cert file {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(RegisterError::Config(format!(
            "the cert file {} holds no certificates",
            path.display()
        )));
    }
    Ok(certs)
}

/// Registry client over the cluster-scoped `Node` API.
#[derive(Clone)]
pub struct KubeRegistry {
    nodes: Api<Node>,
}

impl KubeRegistry {
    /// Build a client from connection settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(settings: &KubeSettings) -> RegisterResult<Self> {
        info!(endpoint = %settings.api, "creating a kubernetes api client");
        let config = settings.to_config()?;
        let client = Client::try_from(config).map_err(|e| {
            RegisterError::Config(format!("unable to create a kubernetes api client: {e}"))
        })?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeRegistry for KubeRegistry {
    async fn list_entries(&self) -> RegisterResult<Vec<RegistryEntry>> {
        let nodes = self
            .nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error("nodes", e))?;
        trace!(count = nodes.items.len(), "listed kubernetes nodes");
        Ok(nodes.items.iter().map(entry_from_node).collect())
    }

    async fn get_entry(&self, name: &str) -> RegisterResult<Option<RegistryEntry>> {
        trace!(node = %name, "checking if node is registered");
        let node = self
            .nodes
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(name, e))?;
        Ok(node.as_ref().map(entry_from_node))
    }

    async fn create_entry(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> RegisterResult<()> {
        if self.get_entry(name).await?.is_some() {
            return Err(RegisterError::Conflict(format!(
                "node {name} is already registered, refusing to create it"
            )));
        }

        self.nodes
            .create(&PostParams::default(), &node_for(name, labels))
            .await
            .map_err(|e| map_kube_error(name, e))?;
        info!(node = %name, "registered node with kubernetes");
        Ok(())
    }

    async fn delete_entry(&self, name: &str) -> RegisterResult<()> {
        self.nodes
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(name, e))?;
        info!(node = %name, "deleted node from kubernetes");
        Ok(())
    }
}

/// Classify a kube error into the agent's taxonomy.
fn map_kube_error(name: &str, err: kube::Error) -> RegisterError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => {
            RegisterError::NotFound(format!("node {name}"))
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            RegisterError::Conflict(format!("node {name}: {}", resp.message))
        }
        other => RegisterError::Transport(format!("kubernetes api request for {name}: {other}")),
    }
}
