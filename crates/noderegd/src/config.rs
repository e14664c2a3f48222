//! Command-line flags and their validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::debug;

use nodereg_core::config::{LabelsFile, MIN_SYNC_INTERVAL, labels_from_env, parse_duration};
use nodereg_core::{ReconcileConfig, RegisterError, RegisterResult, SyncMode, TagSelector};
use nodereg_fleet::FleetClient;
use nodereg_registry::KubeSettings;

#[derive(Debug, Parser)]
#[command(
    name = "noderegd",
    version,
    about = "Registers fleet machines as Kubernetes nodes"
)]
pub struct Cli {
    /// The kubernetes api endpoint to register against.
    #[arg(long, default_value = "https://127.0.0.1:6443")]
    pub api: String,

    /// A kubernetes api token to use when connecting to the endpoint.
    #[arg(long)]
    pub token: Option<String>,

    /// A file containing a token to authenticate to kubernetes.
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// PEM certificate of the CA that signed the api server certificate.
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Skip verification of the api server certificate.
    #[arg(long)]
    pub insecure: bool,

    /// The fleet metadata used to filter machines, as tag=value.
    #[arg(long, default_value = "role=kubernetes")]
    pub metadata: String,

    /// The fleet api socket.
    #[arg(long, default_value = "unix:///var/run/fleet.sock")]
    pub fleet: String,

    /// Only register the machine this daemon runs on.
    #[arg(long)]
    pub standalone: bool,

    /// Public address of this machine in fleet (standalone mode).
    #[arg(long)]
    pub address: Option<String>,

    /// Take the standalone address from this interface instead.
    #[arg(long)]
    pub interface: Option<String>,

    /// Time between reconciliation passes.
    ///
    /// Durations are a sequence of <number><unit> with units ms, s, m
    /// and h (e.g. 90s, 1m30s, 1h30m). A bare number is seconds.
    #[arg(long, default_value = "60s")]
    pub interval: String,

    /// Remove nodes that have not been ready for a while.
    #[arg(long)]
    pub node_reaper: bool,

    /// How long a node may be down before the reaper removes it (e.g. 1h30m).
    #[arg(long, default_value = "1h")]
    pub reap_interval: String,

    /// The port the kubelet serves its health endpoint on.
    #[arg(long, default_value_t = 10255)]
    pub port: u16,

    /// Timeout of a single health probe.
    #[arg(long, default_value = "5s")]
    pub health_timeout: String,

    /// Register machines under their reverse-resolved hostname.
    #[arg(long)]
    pub dns_resolve: bool,

    /// TOML file with a [labels] table added to every node.
    #[arg(long)]
    pub labels_file: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,
}

/// Validated startup settings.
#[derive(Debug)]
pub struct Settings {
    pub kube: KubeSettings,
    pub fleet: FleetClient,
    pub health_port: u16,
    pub health_timeout: Duration,
    pub reconcile: ReconcileConfig,
}

impl Cli {
    /// Validate the flags and build the daemon settings.
    ///
    /// `env` supplies the process environment, scanned for
    /// `NODE_REGISTER_*` label variables.
    pub fn into_settings<I>(self, env: I) -> RegisterResult<Settings>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let interval = parse_duration(&self.interval)?;
        if interval < MIN_SYNC_INTERVAL {
            return Err(RegisterError::Config(format!(
                "the sync interval should be at least {} seconds",
                MIN_SYNC_INTERVAL.as_secs()
            )));
        }

        let selector: TagSelector = self.metadata.parse()?;

        if let Some(path) = &self.token_file {
            ensure_exists(path, "token file")?;
        }
        if let Some(path) = &self.cert {
            ensure_exists(path, "kube cert file")?;
        }
        validate_api(&self.api)?;

        let fleet = FleetClient::new(&self.fleet)?;

        let mode = if self.standalone {
            SyncMode::Standalone {
                address: self.self_address()?,
            }
        } else {
            SyncMode::Fleet
        };

        let mut labels = match &self.labels_file {
            Some(path) => LabelsFile::from_file(path)?.labels,
            None => HashMap::new(),
        };
        labels.extend(labels_from_env(env));
        debug!(count = labels.len(), "collected extra node labels");

        let mut reconcile = ReconcileConfig::new(selector)
            .with_mode(mode)
            .with_extra_labels(labels)
            .with_resolve_names(self.dns_resolve)
            .with_interval(interval);
        if self.node_reaper {
            reconcile = reconcile.with_reaper(parse_duration(&self.reap_interval)?);
        }

        let health_timeout = parse_duration(&self.health_timeout)?;
        if health_timeout.is_zero() {
            return Err(RegisterError::Config(
                "the health timeout must be greater than zero".to_string(),
            ));
        }

        let kube = KubeSettings {
            api: self.api,
            token: self.token,
            token_file: self.token_file,
            ca_cert: self.cert,
            insecure: self.insecure,
        };

        Ok(Settings {
            kube,
            fleet,
            health_port: self.port,
            health_timeout,
            reconcile,
        })
    }

    /// The standalone self address; an interface wins over `--address`.
    fn self_address(&self) -> RegisterResult<String> {
        if let Some(interface) = &self.interface {
            let address = crate::netif::interface_address(interface)?;
            debug!(%interface, %address, "using interface address");
            return Ok(address.to_string());
        }
        match self.address.as_deref() {
            Some(address) if !address.is_empty() => Ok(address.to_string()),
            _ => Err(RegisterError::Config(
                "standalone mode needs either --interface or --address".to_string(),
            )),
        }
    }
}

fn ensure_exists(path: &Path, what: &str) -> RegisterResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(RegisterError::Config(format!(
            "the {what} {} does not exist",
            path.display()
        )))
    }
}

fn validate_api(api: &str) -> RegisterResult<()> {
    let invalid = |reason: &str| {
        RegisterError::Config(format!("invalid url for the kubernetes api '{api}': {reason}"))
    };
    let uri: http::Uri = api.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}
