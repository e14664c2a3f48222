//! Per-member registration state machine.
//!
//! ```text
//! filtered out ─────────────────────────────► Skipped
//! unhealthy ────────────────────────────────► Err(Unhealthy)
//! no entry ───────────────── create ────────► Created
//! entry, first condition Ready ─────────────► AlreadyReady
//! entry, anything else ───── delete, create ► Replaced
//! ```

use tracing::{debug, info};

use nodereg_core::{Member, RegisterError, RegisterResult};

use crate::controller::Reconciler;
use crate::filter;

/// What a single member's reconciliation did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// The member does not match the tag selector.
    Skipped,
    /// A new entry was registered under this name.
    Created(String),
    /// A non-ready entry was deleted and registered again.
    Replaced(String),
    /// The orchestrator reports the entry ready; left alone.
    AlreadyReady(String),
}

impl Reconciler {
    /// Drive one member towards registration.
    ///
    /// Failures abort this member only; the caller moves on to the next.
    pub async fn reconcile_member(&self, mut member: Member) -> RegisterResult<MemberOutcome> {
        let selector = &self.config.selector;
        if !filter::includes(&member, &selector.name, &selector.value) {
            return Ok(MemberOutcome::Skipped);
        }

        if !self.prober.is_healthy(&member.name).await {
            return Err(RegisterError::Unhealthy(member.name));
        }

        if self.config.resolve_names {
            member.name = self.resolve_name(&member.name).await?;
        }

        // Operator-supplied labels override member metadata.
        member.metadata.extend(
            self.config
                .extra_labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let name = member.name;
        let labels = member.metadata;

        match self.registry.get_entry(&name).await? {
            None => {
                self.registry.create_entry(&name, &labels).await?;
                info!(node = %name, "registered member");
                Ok(MemberOutcome::Created(name))
            }
            Some(entry) if entry.is_ready() => {
                debug!(node = %name, "entry is ready, refusing to re-register it");
                Ok(MemberOutcome::AlreadyReady(name))
            }
            Some(entry) => {
                debug!(
                    node = %name,
                    condition = ?entry.first_condition().map(|c| c.kind),
                    "entry is not ready, replacing it"
                );
                match self.registry.delete_entry(&name).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(node = %name, "entry vanished before delete");
                    }
                    Err(e) => return Err(e),
                }
                self.registry.create_entry(&name, &labels).await?;
                info!(node = %name, "re-registered member");
                Ok(MemberOutcome::Replaced(name))
            }
        }
    }

    /// The registration name for `address`: the first reverse-resolved name.
    async fn resolve_name(&self, address: &str) -> RegisterResult<String> {
        let names = self.resolver.resolve(address).await?;
        let name = names
            .into_iter()
            .next()
            .ok_or_else(|| RegisterError::Resolution {
                address: address.to_string(),
                reason: "no names returned".to_string(),
            })?;
        debug!(%address, %name, "resolved member address");
        Ok(name)
    }
}
