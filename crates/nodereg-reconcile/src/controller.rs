//! Reconciliation loop: one tick per interval until shutdown.
//!
//! A tick fetches membership (the full list in fleet mode, only this
//! machine in standalone mode), reconciles each member in the order the
//! membership source returned them, then optionally reaps stale entries.
//! The shutdown signal is only observed between ticks.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use nodereg_core::{Member, ReconcileConfig, RegisterError, SyncMode};
use nodereg_fleet::MembershipSource;
use nodereg_health::HealthProbe;
use nodereg_registry::NodeRegistry;

use crate::member::MemberOutcome;
use crate::reaper::reap_stale_entries;
use crate::resolver::{NameResolver, SystemResolver};

/// Summary of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Members returned by the membership source.
    pub members: u32,
    /// Members excluded by the tag selector.
    pub skipped: u32,
    /// Members whose health probe failed.
    pub unhealthy: u32,
    pub created: u32,
    pub replaced: u32,
    /// Members already registered and ready.
    pub unchanged: u32,
    /// Members whose reconciliation failed for another reason.
    pub failed: u32,
    /// Entries removed by the reaper.
    pub reaped: u32,
}

impl TickReport {
    fn record(&mut self, outcome: &MemberOutcome) {
        match outcome {
            MemberOutcome::Skipped => self.skipped += 1,
            MemberOutcome::Created(_) => self.created += 1,
            MemberOutcome::Replaced(_) => self.replaced += 1,
            MemberOutcome::AlreadyReady(_) => self.unchanged += 1,
        }
    }
}

/// Drives the registry towards the membership service's view.
pub struct Reconciler {
    pub(crate) config: Arc<ReconcileConfig>,
    pub(crate) membership: Arc<dyn MembershipSource>,
    pub(crate) registry: Arc<dyn NodeRegistry>,
    pub(crate) prober: Arc<dyn HealthProbe>,
    pub(crate) resolver: Arc<dyn NameResolver>,
}

impl Reconciler {
    /// Create a reconciler using the system resolver for name lookups.
    pub fn new(
        config: impl Into<Arc<ReconcileConfig>>,
        membership: Arc<dyn MembershipSource>,
        registry: Arc<dyn NodeRegistry>,
        prober: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            config: config.into(),
            membership,
            registry,
            prober,
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Replace the resolver used when name resolution is enabled.
    pub fn with_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run one full reconciliation pass.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let members = self.fetch_members().await;
        report.members = members.len() as u32;

        for member in members {
            let name = member.name.clone();
            match self.reconcile_member(member).await {
                Ok(outcome) => report.record(&outcome),
                Err(RegisterError::Unhealthy(_)) => {
                    report.unhealthy += 1;
                    warn!(member = %name, "member is unhealthy, skipping it for now");
                }
                Err(e) if e.is_retriable() => {
                    report.failed += 1;
                    warn!(member = %name, error = %e, "failed to register member, retrying next tick");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(member = %name, error = %e, "failed to register member");
                }
            }
        }

        if let Some(threshold) = self.config.reap_after {
            match reap_stale_entries(self.registry.as_ref(), threshold, Utc::now()).await {
                Ok(stats) => report.reaped = stats.reaped,
                Err(e) => error!(error = %e, "failed to reap the nodes"),
            }
        }

        info!(
            members = report.members,
            created = report.created,
            replaced = report.replaced,
            unchanged = report.unchanged,
            skipped = report.skipped,
            unhealthy = report.unhealthy,
            failed = report.failed,
            reaped = report.reaped,
            "reconciliation tick complete"
        );
        report
    }

    /// Members to work on this tick. A fetch failure yields none.
    async fn fetch_members(&self) -> Vec<Member> {
        match &self.config.mode {
            SyncMode::Fleet => match self.membership.list_members().await {
                Ok(members) => members,
                Err(e) => {
                    error!(error = %e, "failed to retrieve the list of members");
                    Vec::new()
                }
            },
            SyncMode::Standalone { address } => match self.membership.get_self(address).await {
                Ok(member) => vec![member],
                Err(e) => {
                    error!(%address, error = %e, "failed to retrieve our own member");
                    Vec::new()
                }
            },
        }
    }

    /// Run the reconciliation loop.
    ///
    /// Ticks immediately, then once per interval. A shutdown request is
    /// honoured at the wait between ticks, never in the middle of one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            selector = %self.config.selector,
            mode = ?self.config.mode,
            reaper = self.config.reap_after.is_some(),
            "reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    debug!("sync interval elapsed");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender dropped");
                    }
                    break;
                }
            }
        }

        info!("reconciler shutting down");
    }
}
