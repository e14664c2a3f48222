//! Removal of registry entries that stopped heartbeating.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use nodereg_core::{ConditionKind, RegisterResult, RegistryEntry};
use nodereg_registry::NodeRegistry;

/// Counters from one reaper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapStats {
    /// Entries whose first condition is not ready and carries a heartbeat.
    pub candidates: u32,
    pub reaped: u32,
    pub failed: u32,
}

/// Whether `entry` has been silent for longer than `threshold` as of `now`,
/// or `None` when it is not a reap candidate at all.
fn is_stale(entry: &RegistryEntry, threshold: Duration, now: DateTime<Utc>) -> Option<bool> {
    let condition = entry.first_condition()?;
    if condition.kind == ConditionKind::Ready {
        return None;
    }
    let heartbeat = condition.last_heartbeat?;
    // A heartbeat in the future yields a negative delta, never stale.
    let silent = (now - heartbeat).to_std().ok()?;
    Some(silent > threshold)
}

/// Delete every entry whose first condition is not ready and whose last
/// heartbeat is older than `threshold`.
///
/// Only a failure to list entries fails the pass. Individual delete
/// failures are logged and counted.
pub async fn reap_stale_entries(
    registry: &dyn NodeRegistry,
    threshold: Duration,
    now: DateTime<Utc>,
) -> RegisterResult<ReapStats> {
    let entries = registry.list_entries().await?;
    let mut stats = ReapStats::default();

    for entry in &entries {
        let Some(stale) = is_stale(entry, threshold, now) else {
            continue;
        };
        stats.candidates += 1;
        if !stale {
            continue;
        }

        debug!(node = %entry.name, threshold_secs = threshold.as_secs(), "entry exceeded heartbeat threshold");
        match registry.delete_entry(&entry.name).await {
            Ok(()) => {
                stats.reaped += 1;
                info!(node = %entry.name, "reaped stale node");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(node = %entry.name, error = %e, "failed to delete stale node");
            }
        }
    }

    Ok(stats)
}
