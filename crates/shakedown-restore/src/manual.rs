//! File-level backup and restoration of the storage service.
//!
//! Best effort, and explicitly so: it backs up the files that keep the
//! service's state — placement rings and builder files on the proxies,
//! device contents and local caches on the data nodes — and puts them back
//! afterwards. Damage outside those files survives a restore. When the
//! nodes are cloud VMs, prefer the snapshot strategy.

use std::sync::Arc;

use async_trait::async_trait;
use shakedown_core::config::{ManagementConfig, ServiceLayout};
use shakedown_exec::ExecOptions;
use shakedown_fleet::{Fleet, FleetNode, Role};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::StateRestorer;

/// Restores fleet state from file-level backups on the nodes themselves.
pub struct ManualRestorer {
    fleet: Arc<Fleet>,
    layout: ServiceLayout,
    backup_dir: String,
    overwrite: bool,
}

impl ManualRestorer {
    /// Creates a manual restorer.
    #[must_use]
    pub fn new(fleet: Arc<Fleet>, layout: ServiceLayout, config: &ManagementConfig) -> Self {
        Self {
            fleet,
            layout,
            backup_dir: config.backup_dir.clone(),
            overwrite: config.overwrite,
        }
    }

    /// Every node the storage service runs on, in topology order.
    fn service_nodes(&self) -> Vec<&FleetNode> {
        self.fleet
            .all()
            .iter()
            .filter(|n| n.node.has_role(Role::StorageProxy) || n.node.has_role(Role::StorageData))
            .collect()
    }

    /// Stops the service daemons on every proxy and data node.
    ///
    /// The stop command reports failure when the daemons are already down,
    /// so a failed stop re-queries the running-service status and only
    /// propagates when something is actually still up.
    async fn stop_services(&self) -> Result<()> {
        for node in self.service_nodes() {
            if let Err(err) = node.executor().run(&self.layout.stop_cmd).await {
                let running = node.running_services(&self.layout).await?;
                if !running.is_empty() {
                    warn!(node = %node.name(), services = ?running, "could not stop services");
                    return Err(err.into());
                }
                debug!(node = %node.name(), "services already stopped");
            }
        }
        Ok(())
    }

    /// Starts the service daemons on every data and proxy node. A node
    /// carrying both roles starts both sets.
    async fn start_services(&self) -> Result<()> {
        for node in self.fleet.with_role(Role::StorageData) {
            node.executor().run(&self.layout.start_data_cmd).await?;
        }
        for node in self.fleet.with_role(Role::StorageProxy) {
            node.executor().run(&self.layout.start_proxy_cmd).await?;
        }
        Ok(())
    }

    async fn backup_exists(&self, node: &FleetNode) -> Result<bool> {
        let output = node
            .executor()
            .execute(&format!("test -d {}", self.backup_dir), &ExecOptions::quiet_probe())
            .await?;
        Ok(output.ok())
    }

    async fn backup_files(&self) -> Result<()> {
        let bd = &self.backup_dir;
        let layout = &self.layout;
        for node in self.service_nodes() {
            if !self.overwrite && self.backup_exists(node).await? {
                info!(node = %node.name(), "re-using older manual backup");
                continue;
            }
            let exec = node.executor();
            exec.execute(&format!("rm -rf {bd}"), &ExecOptions::tolerant()).await?;
            if node.node.has_role(Role::StorageProxy) {
                exec.run(&format!(
                    "mkdir -p {bd}/rings && \
                     cp -rp {ring}/*.builder {ring}/*.ring.gz {bd}/rings/",
                    ring = layout.ring_dir
                ))
                .await?;
            }
            if node.node.has_role(Role::StorageData) {
                exec.run(&format!("mkdir -p {bd}/devices {bd}/cache")).await?;
                exec.execute(
                    &format!("cp -rp {cache}/* {bd}/cache/", cache = layout.cache_dir),
                    &ExecOptions::tolerant(),
                )
                .await?;
                for disk in &node.node.disks {
                    if let Some(mount_point) = node.mount_point(disk).await? {
                        exec.run(&format!("cp -rp {mount_point} {bd}/devices/")).await?;
                    }
                }
            }
            let listing =
                exec.execute(&format!("find {bd}"), &ExecOptions::tolerant()).await?;
            debug!(node = %node.name(), contents = %listing.stdout_str(), "backup contents");
        }
        Ok(())
    }

    async fn restore_files(&self) -> Result<()> {
        let bd = &self.backup_dir;
        let layout = &self.layout;
        info!("restoring storage service state from manual backup");
        for node in self.service_nodes() {
            let exec = node.executor();
            if node.node.has_role(Role::StorageProxy) {
                exec.run(&format!(
                    "cd {ring} && rm -f *.builder *.ring.gz && cp -rp {bd}/rings/* {ring}/",
                    ring = layout.ring_dir
                ))
                .await?;
            }
            if node.node.has_role(Role::StorageData) {
                exec.run(&format!("rm -f {cache}/*", cache = layout.cache_dir)).await?;
                for disk in &node.node.disks {
                    node.safe_umount_disk(disk).await?;
                }
                exec.run(&format!("rm -rf {root}/*", root = layout.device_root)).await?;
                for disk in &node.node.disks {
                    exec.run(&format!("mkfs.ext4 -q /dev/{disk} && mount /dev/{disk}")).await?;
                }
                exec.run(&format!("cp -rp {bd}/devices/* {root}/", root = layout.device_root))
                    .await?;
                node.apply_device_fixups(layout).await?;
                exec.execute(
                    &format!("cp -rp {bd}/cache/* {cache}/", cache = layout.cache_dir),
                    &ExecOptions::tolerant(),
                )
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateRestorer for ManualRestorer {
    async fn save(&self, _tag: &str) -> Result<()> {
        info!("saving storage service state");
        self.stop_services().await?;
        // The daemons come back up no matter how the copy went.
        let backup = self.backup_files().await;
        let start = self.start_services().await;
        backup.and(start)
    }

    async fn load(&self, _tag: &str) -> Result<()> {
        self.stop_services().await?;
        let restore = self.restore_files().await;
        let start = self.start_services().await;
        restore.and(start)
    }

    async fn delete(&self, _tag: &str) -> Result<()> {
        for node in self.service_nodes() {
            node.executor()
                .execute(&format!("rm -rf {}", self.backup_dir), &ExecOptions::tolerant())
                .await?;
        }
        Ok(())
    }
}
