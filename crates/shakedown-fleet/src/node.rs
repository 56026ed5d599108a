//! Node identity and topology.

use std::collections::HashSet;
use std::net::{IpAddr, ToSocketAddrs};

use shakedown_core::config::{NodeConfig, Role};
use shakedown_core::error::ConfigError;

/// A single machine in the fleet.
///
/// Constructed once from the static topology at startup. Roles are immutable
/// afterwards; the disk list changes only through the one-time single-disk
/// partition normalization.
#[derive(Debug, Clone)]
pub struct Node {
    /// Short name, used in log lines and snapshot names.
    pub name: String,
    /// Hostname as configured.
    pub hostname: String,
    /// Resolved address.
    pub addr: IpAddr,
    /// Explicit control-plane instance ID, if configured.
    pub instance_id: Option<String>,
    /// Capability roles.
    pub roles: HashSet<Role>,
    /// Managed disk device names, in configured order.
    pub disks: Vec<String>,
}

impl Node {
    /// Builds a node from its topology entry, resolving the hostname.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnresolvedHost`] when neither the explicit IP
    /// nor the hostname yields an address.
    pub fn from_config(config: &NodeConfig) -> Result<Self, ConfigError> {
        let addr = resolve(config)?;
        Ok(Self {
            name: short_name(&config.hostname),
            hostname: config.hostname.clone(),
            addr,
            instance_id: config.instance_id.clone(),
            roles: config.roles.iter().copied().collect(),
            disks: config.disks.clone(),
        })
    }

    /// Whether this node carries the given role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

fn resolve(config: &NodeConfig) -> Result<IpAddr, ConfigError> {
    if let Some(ip) = &config.ip {
        return ip.parse().map_err(|_| ConfigError::UnresolvedHost {
            hostname: ip.clone(),
        });
    }
    if let Ok(addr) = config.hostname.parse::<IpAddr>() {
        return Ok(addr);
    }
    (config.hostname.as_str(), 22)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|sa| sa.ip())
        .ok_or_else(|| ConfigError::UnresolvedHost { hostname: config.hostname.clone() })
}

/// The first hostname label, unless the "hostname" is really an IP address,
/// in which case the whole thing is the name.
fn short_name(hostname: &str) -> String {
    match hostname.split('.').next() {
        Some(label) if !label.is_empty() && label.parse::<u64>().is_err() => label.to_string(),
        _ => hostname.to_string(),
    }
}
