//! Disk fault injection.
//!
//! Simulated failures are force-unmounts; repairs are reformat-and-remount.
//! Mount state is always queried live from the node, never cached beyond a
//! single check.

use metrics::counter;
use shakedown_core::config::ServiceLayout;
use shakedown_exec::ExecOptions;
use tracing::{debug, info, warn};

use crate::error::{FaultError, Result};
use crate::fleet::FleetNode;

/// Partitions created by single-disk normalization.
const PARTITION_COUNT: usize = 3;

impl FleetNode {
    /// Managed disks that currently have an active mount point, in the
    /// node's configured disk order.
    pub async fn mounted_disks(&self) -> Result<Vec<String>> {
        let output = self.executor().run("cat /proc/mounts").await?;
        let mut mounted = Vec::new();
        for disk in &self.node.disks {
            let prefix = format!("/dev/{disk} ");
            if output.stdout.iter().any(|line| line.starts_with(&prefix)) {
                mounted.push(disk.clone());
            }
        }
        Ok(mounted)
    }

    /// Where the given disk is mounted, if anywhere.
    pub async fn mount_point(&self, disk: &str) -> Result<Option<String>> {
        let output = self.executor().run("cat /proc/mounts").await?;
        let prefix = format!("/dev/{disk} ");
        for line in &output.stdout {
            if line.starts_with(&prefix) {
                // "/dev/vdb /srv/node/vdb ext4 rw,noatime 0 0"
                if let Some(point) = line.split_whitespace().nth(1) {
                    return Ok(Some(point.to_string()));
                }
            }
        }
        Ok(None)
    }

    /// Simulates a disk failure by force-unmounting a device.
    ///
    /// Picks the first currently-mounted managed disk when `disk` is not
    /// given. The pick is deterministic so a scenario kills the same disk
    /// every run, given a fixed disk list order. Returns the killed device
    /// name.
    ///
    /// # Errors
    ///
    /// [`FaultError::NoAvailableDisk`] when no managed disk is mounted.
    pub async fn kill_disk(&self, disk: Option<&str>) -> Result<String> {
        let disk = match disk {
            Some(d) => {
                self.require_managed(d)?;
                d.to_string()
            }
            None => self
                .mounted_disks()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| FaultError::NoAvailableDisk { node: self.name().to_string() })?,
        };
        info!(node = %self.name(), disk = %disk, "killing disk");
        self.executor().run(&format!("umount --force -l /dev/{disk}")).await?;
        counter!("shakedown_disks_killed").increment(1);
        Ok(disk)
    }

    /// Unmounts the disk if it is currently mounted; does nothing otherwise.
    pub async fn safe_umount_disk(&self, disk: &str) -> Result<()> {
        if self.mount_point(disk).await?.is_some() {
            self.executor().run(&format!("umount /dev/{disk}")).await?;
        }
        Ok(())
    }

    /// Reformats an unmounted managed disk, simulating its replacement with
    /// a factory-new device.
    ///
    /// # Errors
    ///
    /// [`FaultError::DiskPrecondition`] when the disk is unknown or still
    /// mounted. That is a bug in the calling scenario, not a cluster fault.
    pub async fn format_disk(&self, disk: &str) -> Result<()> {
        self.require_managed(disk)?;
        if self.mount_point(disk).await?.is_some() {
            return Err(FaultError::DiskPrecondition {
                node: self.name().to_string(),
                disk: disk.to_string(),
                reason: "cannot format a mounted disk".to_string(),
            });
        }
        info!(node = %self.name(), disk = %disk, "formatting disk");
        self.executor().run(&format!("mkfs.ext4 -q /dev/{disk}")).await?;
        Ok(())
    }

    /// Repairs a killed disk: mounts it and re-applies the ownership and
    /// SELinux labels the storage service requires.
    ///
    /// Idempotent: calling it on an already-mounted, already-correct disk
    /// only re-applies the fix-ups.
    pub async fn restore_disk(&self, disk: &str, layout: &ServiceLayout) -> Result<()> {
        self.require_managed(disk)?;
        if self.mount_point(disk).await?.is_none() {
            info!(node = %self.name(), disk = %disk, "mounting disk");
            self.executor().run(&format!("mount /dev/{disk}")).await?;
        } else {
            debug!(node = %self.name(), disk = %disk, "disk already mounted");
        }
        self.apply_device_fixups(layout).await
    }

    /// Re-applies ownership and SELinux labels on the device tree.
    pub async fn apply_device_fixups(&self, layout: &ServiceLayout) -> Result<()> {
        let exec = self.executor();
        exec.run(&format!("chown -R {} {}", layout.owner, layout.device_root)).await?;
        exec.run(&format!("restorecon -R {}", layout.device_root)).await?;
        Ok(())
    }

    /// One-time startup normalization for data nodes configured with a
    /// single physical disk.
    ///
    /// The storage layer wants at least three independent failure domains,
    /// so the one disk is split into three partitions and the node's disk
    /// list is rewritten to name them. Skips when all three partitions
    /// already exist from a previous run.
    ///
    /// # Errors
    ///
    /// [`FaultError::PartitionState`] when some but not all of the expected
    /// partitions exist — guessing at a half-partitioned disk is how data
    /// gets destroyed.
    pub async fn partition_single_disk(&mut self) -> Result<()> {
        if self.node.disks.len() != 1 {
            return Err(FaultError::DiskPrecondition {
                node: self.name().to_string(),
                disk: self.node.disks.join(","),
                reason: "single-disk normalization needs exactly one managed disk".to_string(),
            });
        }
        let disk = self.node.disks[0].clone();
        let expected: Vec<String> =
            (1..=PARTITION_COUNT).map(|i| format!("{disk}{i}")).collect();

        let output = self
            .executor()
            .run(&format!("lsblk -nr -o NAME /dev/{disk}"))
            .await?;
        let found: Vec<&String> =
            output.stdout.iter().filter(|name| *name != &disk).collect();

        if found.len() == PARTITION_COUNT
            && expected.iter().all(|p| found.iter().any(|f| *f == p))
        {
            debug!(node = %self.name(), disk = %disk, "disk already partitioned");
            self.node.disks = expected;
            return Ok(());
        }
        if !found.is_empty() {
            return Err(FaultError::PartitionState {
                node: self.name().to_string(),
                disk,
                found: found.len(),
                expected: PARTITION_COUNT,
            });
        }

        warn!(
            node = %self.name(),
            disk = %disk,
            "single managed disk; splitting into {PARTITION_COUNT} partitions"
        );
        self.executor()
            .run(&format!(
                "parted -s /dev/{disk} mklabel gpt \
                 mkpart primary 0% 33% mkpart primary 33% 66% mkpart primary 66% 100%"
            ))
            .await?;
        for part in &expected {
            self.executor().run(&format!("mkfs.ext4 -q /dev/{part}")).await?;
        }
        self.node.disks = expected;
        Ok(())
    }

    /// Which service daemons are currently running, according to the
    /// service's own status command.
    pub async fn running_services(&self, layout: &ServiceLayout) -> Result<Vec<String>> {
        let output = self
            .executor()
            .execute(&layout.status_cmd, &ExecOptions::tolerant())
            .await?;
        Ok(output
            .stdout
            .iter()
            .filter(|line| !line.starts_with("No ") && !line.trim().is_empty())
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    fn require_managed(&self, disk: &str) -> Result<()> {
        if self.node.disks.iter().any(|d| d == disk) {
            Ok(())
        } else {
            Err(FaultError::DiskPrecondition {
                node: self.name().to_string(),
                disk: disk.to_string(),
                reason: "not a managed disk".to_string(),
            })
        }
    }
}
