//! nodereg-core — shared vocabulary for the node-register agent.
//!
//! Holds the domain types exchanged between the membership source, the
//! registry client and the reconciliation engine, the error taxonomy
//! every crate reports through, and the configuration values built once
//! at startup.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ReconcileConfig, SyncMode, TagSelector};
pub use error::{RegisterError, RegisterResult};
pub use types::{ConditionKind, Member, NodeCondition, RegistryEntry};
