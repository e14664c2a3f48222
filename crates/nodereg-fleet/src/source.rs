//! The membership source seam.

use async_trait::async_trait;

use nodereg_core::{Member, RegisterError, RegisterResult};

/// Enumerates the members of the cluster-membership service.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Every member currently known, in the order the service reports.
    async fn list_members(&self) -> RegisterResult<Vec<Member>>;

    /// The member this process runs on, identified by its address.
    async fn get_self(&self, address: &str) -> RegisterResult<Member> {
        self.list_members()
            .await?
            .into_iter()
            .find(|m| m.name == address)
            .ok_or_else(|| {
                RegisterError::NotFound(format!(
                    "machine {address} is not in the list of members"
                ))
            })
    }
}
