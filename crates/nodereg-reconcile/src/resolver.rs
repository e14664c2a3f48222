//! Reverse-name resolution of member addresses.

use std::net::IpAddr;

use async_trait::async_trait;

use nodereg_core::{RegisterError, RegisterResult};

/// Resolves a member address to the names it is known by.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Names for `address`, most canonical first.
    async fn resolve(&self, address: &str) -> RegisterResult<Vec<String>>;
}

/// Reverse lookup through the platform resolver (hosts file, DNS PTR).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, address: &str) -> RegisterResult<Vec<String>> {
        let ip: IpAddr = address.parse().map_err(|_| resolution(address, "not an ip address"))?;

        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
            .await
            .map_err(|e| resolution(address, &format!("lookup task failed: {e}")))?
            .map_err(|e| resolution(address, &e.to_string()))?;

        Ok(vec![checked_name(address, &name)?])
    }
}

/// Validate a name returned by the platform resolver.
///
/// Without a PTR record the resolver echoes the numeric address back,
/// which is not a name to register under.
fn checked_name(address: &str, name: &str) -> RegisterResult<String> {
    let name = name.trim_end_matches('.');
    if name.is_empty() {
        return Err(resolution(address, "empty name returned"));
    }
    if name.parse::<IpAddr>().is_ok() {
        return Err(resolution(address, "no name record"));
    }
    Ok(name.to_string())
}

fn resolution(address: &str, reason: &str) -> RegisterError {
    RegisterError::Resolution {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
