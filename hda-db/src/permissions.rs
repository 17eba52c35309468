//! Write-permission policy for national-network databases.
//!
//! Connections to a database on the national network are read-only unless
//! the connected account is one of the service accounts authorized for that
//! host. Any host not on the national list is writable.

use hda_core::{DataAccessError, Result};
use std::net::{IpAddr, ToSocketAddrs};

/// National database hosts and the service accounts allowed to write to
/// each, keyed by IP address.
const NATIONAL_DATABASES: &[(&str, &[&str])] = &[
    ("140.194.20.214", &["S0CWMSP2"]),
    ("140.194.45.154", &["S0CWMSZ2"]),
    ("140.194.45.148", &["S0CWMSZ2"]),
];

/// Resolve a host string to an IP. A literal address parses directly;
/// anything else goes through name resolution.
fn host_ip(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    (host, 0u16)
        .to_socket_addrs()
        .ok()?
        .next()
        .map(|addr| addr.ip())
}

/// The accounts allowed to write to a national host, or `None` when the
/// host is not on the national list.
fn allowed_writers(ip: &IpAddr) -> Option<&'static [&'static str]> {
    let text = ip.to_string();
    NATIONAL_DATABASES
        .iter()
        .find(|(addr, _)| *addr == text)
        .map(|(_, accounts)| *accounts)
}

/// Whether `user` may write to the database at `host`.
///
/// A host that cannot be resolved aborts the check: the host might be on
/// the national list, so defaulting to writable is not safe.
pub fn user_can_write(host: &str, user: &str) -> Result<bool> {
    let ip = host_ip(host).ok_or_else(|| {
        DataAccessError::BackendUnavailable(format!("cannot resolve host \"{host}\""))
    })?;
    Ok(match allowed_writers(&ip) {
        Some(accounts) => accounts.iter().any(|a| a.eq_ignore_ascii_case(user)),
        None => true,
    })
}
