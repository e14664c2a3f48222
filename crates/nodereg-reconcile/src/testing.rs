//! In-process collaborators for reconciliation tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use nodereg_core::{Member, RegisterError, RegisterResult, RegistryEntry};
use nodereg_fleet::MembershipSource;
use nodereg_health::HealthProbe;
use nodereg_registry::NodeRegistry;

use crate::resolver::NameResolver;

/// A registry call, as observed by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Get(String),
    Create(String, HashMap<String, String>),
    Delete(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Create(..) | Call::Delete(_))
    }
}

/// Registry double that keeps entries in memory and logs every call.
#[derive(Default)]
pub struct RecordingRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
    calls: Mutex<Vec<Call>>,
    fail_list: bool,
    fail_get: HashSet<String>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, entry: RegistryEntry) -> Self {
        self.entries.lock().unwrap().push(entry);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_get(mut self, name: &str) -> Self {
        self.fail_get.insert(name.to_string());
        self
    }

    pub fn failing_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    pub fn failing_delete(mut self, name: &str) -> Self {
        self.fail_delete.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NodeRegistry for RecordingRegistry {
    async fn list_entries(&self) -> RegisterResult<Vec<RegistryEntry>> {
        self.record(Call::List);
        if self.fail_list {
            return Err(RegisterError::Transport("list refused".into()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn get_entry(&self, name: &str) -> RegisterResult<Option<RegistryEntry>> {
        self.record(Call::Get(name.to_string()));
        if self.fail_get.contains(name) {
            return Err(RegisterError::Transport(format!("get {name} refused")));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().find(|e| e.name == name).cloned())
    }

    async fn create_entry(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> RegisterResult<()> {
        self.record(Call::Create(name.to_string(), labels.clone()));
        if self.fail_create.contains(name) {
            return Err(RegisterError::Transport(format!("create {name} refused")));
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.name == name) {
            return Err(RegisterError::Conflict(name.to_string()));
        }
        let mut entry = RegistryEntry::new(name);
        entry.labels = labels.clone();
        entries.push(entry);
        Ok(())
    }

    async fn delete_entry(&self, name: &str) -> RegisterResult<()> {
        self.record(Call::Delete(name.to_string()));
        if self.fail_delete.contains(name) {
            return Err(RegisterError::Transport(format!("delete {name} refused")));
        }
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() == before {
            return Err(RegisterError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

/// Membership double returning a fixed list, or failing.
pub struct StaticMembership {
    members: Option<Vec<Member>>,
}

impl StaticMembership {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            members: Some(members),
        }
    }

    pub fn unreachable() -> Self {
        Self { members: None }
    }
}

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn list_members(&self) -> RegisterResult<Vec<Member>> {
        self.members
            .clone()
            .ok_or_else(|| RegisterError::Transport("membership socket closed".into()))
    }
}

/// Health double: everyone healthy except the listed names.
#[derive(Default)]
pub struct FixedProbe {
    unhealthy: HashSet<String>,
    probed: Mutex<Vec<String>>,
}

impl FixedProbe {
    pub fn all_healthy() -> Self {
        Self::default()
    }

    pub fn unhealthy(names: &[&str]) -> Self {
        Self {
            unhealthy: names.iter().map(|n| n.to_string()).collect(),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FixedProbe {
    async fn is_healthy(&self, hostname: &str) -> bool {
        self.probed.lock().unwrap().push(hostname.to_string());
        !self.unhealthy.contains(hostname)
    }
}

/// Resolver double backed by a lookup table.
#[derive(Default)]
pub struct TableResolver {
    names: HashMap<String, Vec<String>>,
}

impl TableResolver {
    pub fn with(mut self, address: &str, names: &[&str]) -> Self {
        self.names.insert(
            address.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl NameResolver for TableResolver {
    async fn resolve(&self, address: &str) -> RegisterResult<Vec<String>> {
        self.names
            .get(address)
            .cloned()
            .ok_or_else(|| RegisterError::Resolution {
                address: address.to_string(),
                reason: "no PTR record".to_string(),
            })
    }
}
