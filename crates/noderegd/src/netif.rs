//! Network interface address lookup.

use std::net::IpAddr;

use nodereg_core::{RegisterError, RegisterResult};

/// The address of interface `name`: its first IPv4 address, or its first
/// IPv6 address when it has no IPv4 one.
pub fn interface_address(name: &str) -> RegisterResult<IpAddr> {
    let interfaces = if_addrs::get_if_addrs().map_err(|e| {
        RegisterError::Config(format!("unable to list network interfaces: {e}"))
    })?;
    pick_address(
        name,
        interfaces.iter().map(|iface| (iface.name.as_str(), iface.ip())),
    )
}

/// Choose the address of `name` among `(interface, address)` pairs.
fn pick_address<'a, I>(name: &str, addresses: I) -> RegisterResult<IpAddr>
where
    I: IntoIterator<Item = (&'a str, IpAddr)>,
{
    let mut v6 = None;

    for (ifname, ip) in addresses {
        if ifname != name {
            continue;
        }
        match ip {
            IpAddr::V4(_) => return Ok(ip),
            IpAddr::V6(_) if v6.is_none() => v6 = Some(ip),
            IpAddr::V6(_) => {}
        }
    }

    v6.ok_or_else(|| {
        RegisterError::Config(format!(
            "the interface {name} does not exist or has no ip address"
        ))
    })
}
