//! Conversion between Kubernetes `Node` objects and registry entries.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::{Node, NodeCondition as KubeNodeCondition};
use kube::api::ObjectMeta;

use nodereg_core::{ConditionKind, NodeCondition, RegistryEntry};

/// Condition type the kubelet uses to report readiness.
pub const READY_CONDITION: &str = "Ready";

/// Map a Kubernetes condition onto the agent's readiness model.
///
/// Only a `Ready` condition can report the ready state; every other
/// condition type counts as not ready.
pub fn condition_kind(type_: &str, status: &str) -> ConditionKind {
    if type_ != READY_CONDITION {
        return ConditionKind::NotReady;
    }
    match status {
        "True" => ConditionKind::Ready,
        "False" => ConditionKind::NotReady,
        _ => ConditionKind::Unknown,
    }
}

fn convert_condition(condition: &KubeNodeCondition) -> NodeCondition {
    NodeCondition {
        kind: condition_kind(&condition.type_, &condition.status),
        last_heartbeat: condition.last_heartbeat_time.as_ref().map(|t| t.0),
    }
}

/// Build a registry entry from a node, keeping condition order.
pub fn entry_from_node(node: &Node) -> RegistryEntry {
    let labels: HashMap<String, String> = node
        .metadata
        .labels
        .as_ref()
        .map(|l| l.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|c| c.iter().map(convert_condition).collect())
        .unwrap_or_default();

    RegistryEntry {
        name: node.metadata.name.clone().unwrap_or_default(),
        labels,
        conditions,
    }
}

/// The node object submitted when registering `name`.
pub fn node_for(name: &str, labels: &HashMap<String, String>) -> Node {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}
