//! Domain types shared by the membership source, the registry client
//! and the reconciliation engine.
//!
//! Nothing here is persisted: members are produced fresh every tick and
//! registry entries are re-read from the orchestrator each time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Membership ────────────────────────────────────────────────────

/// One machine reported by the cluster-membership service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    /// Address or hostname the membership service knows the machine by.
    pub name: String,
    /// Free-form metadata; the tag selector is matched against it.
    pub metadata: HashMap<String, String>,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add one metadata pair (builder style).
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ── Registry ──────────────────────────────────────────────────────

/// Readiness reported by a registry entry's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Ready,
    NotReady,
    Unknown,
}

/// One condition record of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    pub kind: ConditionKind,
    /// Last heartbeat the orchestrator recorded for this condition.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl NodeCondition {
    pub fn new(kind: ConditionKind, last_heartbeat: DateTime<Utc>) -> Self {
        Self {
            kind,
            last_heartbeat: Some(last_heartbeat),
        }
    }
}

/// A node record held by the orchestrator's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Ordered as reported; only the first element is authoritative.
    pub conditions: Vec<NodeCondition>,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: NodeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// The condition this agent bases its decisions on.
    pub fn first_condition(&self) -> Option<&NodeCondition> {
        self.conditions.first()
    }

    /// True only when the first condition reports the ready state.
    /// An entry without conditions is not ready.
    pub fn is_ready(&self) -> bool {
        self.first_condition()
            .is_some_and(|c| c.kind == ConditionKind::Ready)
    }
}
