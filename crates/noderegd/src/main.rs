//! noderegd — the node-register daemon.
//!
//! Periodically reconciles fleet cluster membership into the Kubernetes
//! node registry:
//! - Fleet mode registers every tagged, healthy machine
//! - Standalone mode registers only the machine it runs on
//! - The optional reaper removes nodes that stopped heartbeating
//!
//! # Usage
//!
//! ```text
//! noderegd --api https://10.0.0.1:6443 --token-file /etc/kubernetes/token \
//!          --metadata role=kubernetes --node-reaper --reap-interval 2h
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodereg_health::HttpProber;
use nodereg_reconcile::Reconciler;
use nodereg_registry::KubeRegistry;
use noderegd::Cli;

const DEFAULT_LOG_FILTER: &str = "info,noderegd=debug,nodereg=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = cli
        .into_settings(std::env::vars())
        .context("invalid options")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %settings.kube.api,
        fleet = %settings.fleet.socket_path().display(),
        "starting the node register service"
    );

    // ── Clients ────────────────────────────────────────────────

    let registry = KubeRegistry::connect(&settings.kube).with_context(|| {
        format!(
            "failed to create a kubernetes client, endpoint: {}",
            settings.kube.api
        )
    })?;

    let prober = HttpProber::new(settings.health_port, settings.health_timeout);
    info!(
        port = prober.port(),
        timeout_ms = settings.health_timeout.as_millis() as u64,
        "probing member health"
    );

    let reconciler = Reconciler::new(
        settings.reconcile,
        Arc::new(settings.fleet),
        Arc::new(registry),
        Arc::new(prober),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut signals = ShutdownSignals::install().context("failed to install signal handlers")?;
    tokio::spawn(async move {
        let name = signals.recv().await;
        info!(signal = name, "received a shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await;

    info!("node register service stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The termination signals the daemon listens for.
struct ShutdownSignals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Wait for the first of them and return its name.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}
