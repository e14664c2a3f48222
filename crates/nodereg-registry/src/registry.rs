//! The registry client seam.

use std::collections::HashMap;

use async_trait::async_trait;

use nodereg_core::{RegisterResult, RegistryEntry};

/// CRUD over the orchestrator's node records.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Every registered entry.
    async fn list_entries(&self) -> RegisterResult<Vec<RegistryEntry>>;

    /// The entry with this name, if registered.
    async fn get_entry(&self, name: &str) -> RegisterResult<Option<RegistryEntry>>;

    /// Register a new entry. Fails with `Conflict` if the name is taken.
    async fn create_entry(&self, name: &str, labels: &HashMap<String, String>)
    -> RegisterResult<()>;

    /// Remove an entry. Fails with `NotFound` if it is already gone.
    async fn delete_entry(&self, name: &str) -> RegisterResult<()>;
}
