//! Configuration for the shakedown harness.
//!
//! The harness is driven by a single TOML file describing the fleet topology
//! (nodes, roles, managed disks), the state-restoration management backend,
//! the storage endpoint under test, and the on-disk layout of the storage
//! service. The core components never reach into ambient global state; they
//! receive the relevant section of this configuration explicitly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for a shakedown run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The fleet topology. At least one node is required.
    pub nodes: Vec<NodeConfig>,
    /// State restoration management backend.
    pub management: ManagementConfig,
    /// Storage endpoint under test.
    pub storage: StorageConfig,
    /// On-disk layout of the storage service.
    #[serde(default)]
    pub service: ServiceLayout,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("at least one node is required".into()));
        }
        if self.storage.replica_count == 0 {
            return Err(ConfigError::Invalid("replica_count must be at least 1".into()));
        }
        if self.management.kind == ManagementType::Snapshot {
            if self.management.compute_url.is_none() {
                return Err(ConfigError::Invalid(
                    "management.compute_url is required for the snapshot backend".into(),
                ));
            }
            if self.management.token.is_none() {
                return Err(ConfigError::Invalid(
                    "management.token is required for the snapshot backend".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A single node in the fleet topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hostname or IP address. Must resolve to an address at startup.
    pub hostname: String,
    /// Explicit IP address, when the hostname should not be resolved.
    pub ip: Option<String>,
    /// Explicit control-plane instance ID, when IP matching is ambiguous.
    pub instance_id: Option<String>,
    /// SSH user for remote command execution.
    #[serde(default = "default_username")]
    pub username: String,
    /// SSH identity file for remote command execution.
    pub key_path: Option<PathBuf>,
    /// Capability roles of this node. Non-exclusive.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Managed disk device names, in order. Order matters: fault injection
    /// picks the first mounted disk, so a fixed order keeps tests
    /// reproducible.
    #[serde(default)]
    pub disks: Vec<String>,
}

fn default_username() -> String {
    "root".to_string()
}

/// Capability roles a node can carry, depending on which services run on it.
/// A node can have more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Runs the storage proxy (placement ring lives here).
    StorageProxy,
    /// Holds storage devices with object data.
    StorageData,
    /// Runs the cluster control plane.
    ControlPlane,
    /// Runs compute workloads.
    Compute,
    /// Runs the identity service.
    Identity,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StorageProxy => "storage_proxy",
            Self::StorageData => "storage_data",
            Self::ControlPlane => "control_plane",
            Self::Compute => "compute",
            Self::Identity => "identity",
        };
        write!(f, "{s}")
    }
}

/// Which state restoration backend to use between scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementType {
    /// No restoration at all; scenarios are not isolated from each other.
    None,
    /// File-level backup and restore of the storage service. Best effort.
    Manual,
    /// Cloud VM image snapshot and rebuild.
    Snapshot,
}

/// Configuration for the state restoration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Backend selector. Unknown values fail at parse time, before any
    /// scenario runs.
    #[serde(rename = "type")]
    pub kind: ManagementType,
    /// Prefix of snapshot image names: `{prefix}_{node}[_{tag}]`.
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
    /// Remote directory used by the manual backend for file backups.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Whether the manual backend may overwrite an existing backup.
    #[serde(default)]
    pub overwrite: bool,
    /// Base URL of the compute API (snapshot backend only).
    pub compute_url: Option<String>,
    /// Auth token for the compute API (snapshot backend only).
    pub token: Option<String>,
    /// How long to wait for images/instances to become active.
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_secs: u64,
    /// How long to wait for rebuilt instances to accept command sessions.
    #[serde(default = "default_boot_timeout")]
    pub boot_timeout_secs: u64,
    /// Delay between control-plane status polls.
    #[serde(default = "default_mgmt_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_snapshot_prefix() -> String {
    "shakedown-snapshot".to_string()
}

fn default_backup_dir() -> String {
    "/var/tmp/shakedown-backup".to_string()
}

fn default_snapshot_timeout() -> u64 {
    300
}

fn default_boot_timeout() -> u64 {
    180
}

fn default_mgmt_poll_interval() -> u64 {
    5
}

impl ManagementConfig {
    /// Timeout for image/instance state polls.
    #[must_use]
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }

    /// Timeout for the post-rebuild command-session readiness probe.
    #[must_use]
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Delay between control-plane status polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// The storage endpoint and verification parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage API endpoint of the test account, including the account path,
    /// e.g. `http://proxy.example.com:8080/v1/AUTH_test`.
    pub endpoint: String,
    /// Auth token sent with storage API requests.
    pub token: String,
    /// Expected number of replicas of every object and container.
    #[serde(default = "default_replica_count")]
    pub replica_count: usize,
    /// Deadline for replica regeneration after a failure.
    #[serde(default = "default_convergence_timeout")]
    pub convergence_timeout_secs: u64,
    /// Deadline for handoff-copy cleanup after a repair. Cleanup is its own
    /// eventually-consistent process, so it gets its own deadline.
    #[serde(default = "default_handoff_timeout")]
    pub handoff_timeout_secs: u64,
    /// Delay between consistency polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_replica_count() -> usize {
    3
}

fn default_convergence_timeout() -> u64 {
    300
}

fn default_handoff_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    5
}

impl StorageConfig {
    /// Deadline for replica regeneration.
    #[must_use]
    pub fn convergence_timeout(&self) -> Duration {
        Duration::from_secs(self.convergence_timeout_secs)
    }

    /// Deadline for handoff-copy cleanup.
    #[must_use]
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }

    /// Delay between consistency polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Where the storage service keeps its state on each node, and how its
/// daemons are driven.
///
/// The defaults match an OpenStack Swift installation; every path and
/// command can be overridden for other ring-based stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLayout {
    /// Directory holding the placement ring and builder files.
    pub ring_dir: String,
    /// Root directory under which storage devices are mounted.
    pub device_root: String,
    /// Directory holding the service's local cache files.
    pub cache_dir: String,
    /// `user:group` owning the device tree.
    pub owner: String,
    /// Binary that maps an entity to its candidate replica locations.
    pub ring_lookup_bin: String,
    /// Command that stops all service daemons on a node.
    pub stop_cmd: String,
    /// Command that starts the daemons on a data node.
    pub start_data_cmd: String,
    /// Command that starts the daemons on a proxy node.
    pub start_proxy_cmd: String,
    /// Command that reports which daemons are running.
    pub status_cmd: String,
}

impl Default for ServiceLayout {
    fn default() -> Self {
        Self {
            ring_dir: "/etc/swift".to_string(),
            device_root: "/srv/node".to_string(),
            cache_dir: "/var/cache/swift".to_string(),
            owner: "swift:swift".to_string(),
            ring_lookup_bin: "swift-get-nodes".to_string(),
            stop_cmd: "swift-init all stop".to_string(),
            start_data_cmd: "swift-init account container object rest start".to_string(),
            start_proxy_cmd: "swift-init proxy start".to_string(),
            status_cmd: "swift-init all status".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when `RUST_LOG` is not set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for log aggregation.
    Json,
}
