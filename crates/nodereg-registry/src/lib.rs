//! nodereg-registry — the orchestrator's node registry.
//!
//! [`NodeRegistry`] is the seam the reconciliation engine drives; it
//! only knows how to list, look up, create and delete entries. There is
//! deliberately no update operation: an entry that needs refreshing is
//! deleted and created again.
//!
//! [`KubeRegistry`] implements the seam against the Kubernetes `Node`
//! API using kube-rs.

pub mod client;
pub mod convert;
pub mod registry;

pub use client::{KubeRegistry, KubeSettings};
pub use registry::NodeRegistry;
