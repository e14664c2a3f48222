//! nodereg-reconcile — keeps the node registry in step with membership.
//!
//! Every tick re-derives the desired state from the membership source
//! and drives the registry towards it. No state survives between ticks,
//! so a failed tick is simply retried on the next interval.
//!
//! # Architecture
//!
//! ```text
//! Reconciler::run (interval timer | shutdown signal)
//!   └── tick()
//!       ├── MembershipSource::list_members / get_self
//!       ├── per member: reconcile_member()
//!       │   ├── filter::includes        (tag selector)
//!       │   ├── HealthProbe::is_healthy (gate, retried next tick)
//!       │   ├── NameResolver::resolve   (optional)
//!       │   └── NodeRegistry            get → create | skip | delete+create
//!       └── reaper::reap_stale_entries  (optional)
//! ```
//!
//! # Registration rules
//!
//! An entry whose first condition reports the ready state is never
//! touched. Any other existing entry is deleted and registered again,
//! which is how a machine that rejoined under the same name gets a clean
//! record. The registry offers no update call, so delete-then-create is
//! the only way to refresh an entry.

pub mod controller;
pub mod filter;
pub mod member;
pub mod reaper;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use controller::{Reconciler, TickReport};
pub use member::MemberOutcome;
pub use reaper::{ReapStats, reap_stale_entries};
pub use resolver::{NameResolver, SystemResolver};
