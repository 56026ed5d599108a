//! Cloud-image snapshot restoration.
//!
//! Each node is resolved to a compute instance, captured as an image at
//! `save`, and rebuilt from that image at `load`. This is the thorough
//! restoration strategy: the whole root filesystem comes back, not just the
//! files the harness knows about.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use shakedown_core::config::ManagementConfig;
use shakedown_exec::ExecOptions;
use shakedown_fleet::{Fleet, FleetNode};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::compute::ComputeApi;
use crate::error::{RestoreError, Result};
use crate::StateRestorer;

/// Restores fleet state by rebuilding cloud VMs from snapshot images.
pub struct SnapshotRestorer {
    compute: Arc<dyn ComputeApi>,
    fleet: Arc<Fleet>,
    prefix: String,
    snapshot_timeout: Duration,
    boot_timeout: Duration,
    poll_interval: Duration,
}

impl SnapshotRestorer {
    /// Creates a snapshot restorer over the given compute backend.
    #[must_use]
    pub fn new(compute: Arc<dyn ComputeApi>, fleet: Arc<Fleet>, config: &ManagementConfig) -> Self {
        Self {
            compute,
            fleet,
            prefix: config.snapshot_prefix.clone(),
            snapshot_timeout: config.snapshot_timeout(),
            boot_timeout: config.boot_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// The image name for one node: `{prefix}_{node}[_{tag}]`.
    fn snapshot_name(&self, node: &FleetNode, tag: &str) -> String {
        if tag.is_empty() {
            format!("{}_{}", self.prefix, node.name())
        } else {
            format!("{}_{}_{}", self.prefix, node.name(), tag)
        }
    }

    /// Computes every node's snapshot name, failing on a collision. Two
    /// nodes with the same computed name would make restoration ambiguous,
    /// so this runs before any image is created.
    fn snapshot_names(&self, tag: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.fleet.len());
        for node in self.fleet.all() {
            let name = self.snapshot_name(node, tag);
            if !seen.insert(name.clone()) {
                return Err(RestoreError::SnapshotCollision { name });
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Resolves a node to its compute instance ID: the explicit
    /// `instance_id` wins, otherwise the node's address is matched against
    /// every instance's attached networks.
    async fn resolve_instance(&self, node: &FleetNode) -> Result<String> {
        if let Some(id) = &node.node.instance_id {
            return Ok(self.compute.instance(id).await?.id);
        }
        let ip = node.node.addr.to_string();
        let mut found = None;
        for instance in self.compute.list_instances().await? {
            if instance.has_address(&ip) {
                if found.is_some() {
                    return Err(RestoreError::AmbiguousInstance { ip });
                }
                found = Some(instance.id);
            }
        }
        found.ok_or_else(|| RestoreError::InstanceNotFound { node: node.name().to_string() })
    }

    async fn wait_for_images(&self, ids: &[String]) -> Result<()> {
        let start = Instant::now();
        loop {
            let mut all_active = true;
            for id in ids {
                if !self.compute.image(id).await?.is_active() {
                    all_active = false;
                    break;
                }
            }
            if all_active {
                return Ok(());
            }
            if start.elapsed() >= self.snapshot_timeout {
                return Err(RestoreError::Timeout {
                    what: "snapshot images to become active".to_string(),
                    waited: start.elapsed(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn wait_for_instances(&self, ids: &[String]) -> Result<()> {
        let start = Instant::now();
        loop {
            let mut all_active = true;
            for id in ids {
                if !self.compute.instance(id).await?.is_active() {
                    all_active = false;
                    break;
                }
            }
            if all_active {
                return Ok(());
            }
            if start.elapsed() >= self.snapshot_timeout {
                return Err(RestoreError::Timeout {
                    what: "rebuilt instances to become active".to_string(),
                    waited: start.elapsed(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Waits until every node accepts a command session again. An active
    /// instance is not necessarily a booted one; probing the session is the
    /// only signal that means "ready" rather than guessing with a fixed
    /// settle sleep.
    async fn wait_for_sessions(&self) -> Result<()> {
        let start = Instant::now();
        for node in self.fleet.all() {
            loop {
                let ready = matches!(
                    node.executor().execute("true", &ExecOptions::quiet_probe()).await,
                    Ok(output) if output.ok()
                );
                if ready {
                    debug!(node = %node.name(), "command session re-established");
                    break;
                }
                if start.elapsed() >= self.boot_timeout {
                    return Err(RestoreError::Timeout {
                        what: format!("command session on node '{}'", node.name()),
                        waited: start.elapsed(),
                    });
                }
                sleep(self.poll_interval).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateRestorer for SnapshotRestorer {
    async fn save(&self, tag: &str) -> Result<()> {
        let names = self.snapshot_names(tag)?;

        let mut image_ids = Vec::with_capacity(names.len());
        for (node, name) in self.fleet.all().iter().zip(&names) {
            let instance_id = self.resolve_instance(node).await?;
            if let Some(existing) = self.compute.find_image(name).await? {
                warn!(snapshot = %name, "snapshot already exists, re-using it");
                image_ids.push(existing.id);
                continue;
            }
            // Flush the filesystem so the image is as consistent as an
            // unplugged disk can be.
            node.executor().run("sync").await?;
            info!(node = %node.name(), snapshot = %name, "creating snapshot");
            let image_id = self.compute.create_image(&instance_id, name).await?;
            counter!("shakedown_snapshots_created").increment(1);
            image_ids.push(image_id);
        }

        self.wait_for_images(&image_ids).await
    }

    async fn load(&self, tag: &str) -> Result<()> {
        let names = self.snapshot_names(tag)?;

        let mut instance_ids = Vec::with_capacity(names.len());
        for (node, name) in self.fleet.all().iter().zip(&names) {
            let instance_id = self.resolve_instance(node).await?;
            let image = self
                .compute
                .find_image(name)
                .await?
                .ok_or_else(|| RestoreError::SnapshotNotFound { name: name.clone() })?;
            info!(node = %node.name(), snapshot = %name, "rebuilding instance from snapshot");
            self.compute.rebuild(&instance_id, &image.id).await?;
            instance_ids.push(instance_id);
        }

        self.wait_for_instances(&instance_ids).await?;
        self.wait_for_sessions().await?;
        counter!("shakedown_baseline_restores").increment(1);
        Ok(())
    }

    async fn delete(&self, tag: &str) -> Result<()> {
        for node in self.fleet.all() {
            let name = self.snapshot_name(node, tag);
            match self.compute.find_image(&name).await? {
                Some(image) => {
                    info!(snapshot = %name, "deleting snapshot");
                    self.compute.delete_image(&image.id).await?;
                }
                None => warn!(snapshot = %name, "snapshot not found, nothing to delete"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet as StdHashSet;

    use shakedown_core::config::{ManagementConfig, ManagementType, Role};
    use shakedown_exec::ScriptedExecutor;
    use shakedown_fleet::Node;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::HttpComputeClient;

    fn fleet_node(name: &str, addr: &str) -> (FleetNode, Arc<ScriptedExecutor>) {
        let exec = Arc::new(ScriptedExecutor::new(name));
        let node = Node {
            name: name.to_string(),
            hostname: name.to_string(),
            addr: addr.parse().unwrap(),
            instance_id: None,
            roles: StdHashSet::from([Role::StorageData]),
            disks: vec!["vdb".to_string()],
        };
        (FleetNode::new(node, exec.clone()), exec)
    }

    fn management(poll_secs: u64, timeout_secs: u64) -> ManagementConfig {
        ManagementConfig {
            kind: ManagementType::Snapshot,
            snapshot_prefix: "shakedown-snapshot".into(),
            backup_dir: "/var/tmp/shakedown-backup".into(),
            overwrite: false,
            compute_url: None,
            token: None,
            snapshot_timeout_secs: timeout_secs,
            boot_timeout_secs: timeout_secs,
            poll_interval_secs: poll_secs,
        }
    }

    fn restorer(server: &MockServer, fleet: Fleet) -> SnapshotRestorer {
        let compute = Arc::new(HttpComputeClient::new(&server.uri(), "secret"));
        SnapshotRestorer::new(compute, Arc::new(fleet), &management(0, 30))
    }

    async fn mount_instances(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "servers": [
                    {"id": "i-1", "name": "data1", "status": "ACTIVE",
                     "addresses": {"private": ["192.0.2.11"]}}
                ]
            })))
            .mount(server)
            .await;
    }

    async fn mount_no_image(server: &MockServer, name: &str) {
        Mock::given(method("GET"))
            .and(path("/images"))
            .and(query_param("name", name))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"images": []})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_save_creates_image_and_waits_for_active() {
        let server = MockServer::start().await;
        mount_instances(&server).await;
        mount_no_image(&server, "shakedown-snapshot_data1").await;
        Mock::given(method("POST"))
            .and(path("/servers/i-1/action"))
            .and(body_partial_json(
                serde_json::json!({"createImage": {"name": "shakedown-snapshot_data1"}}),
            ))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Location", "http://cloud/images/img-1"),
            )
            .expect(1)
            .mount(&server)
            .await;
        // First poll sees the image still saving, second sees it active.
        Mock::given(method("GET"))
            .and(path("/images/img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image": {"id": "img-1", "name": "shakedown-snapshot_data1", "status": "SAVING"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/images/img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image": {"id": "img-1", "name": "shakedown-snapshot_data1", "status": "ACTIVE"}
            })))
            .mount(&server)
            .await;

        let (node, exec) = fleet_node("data1", "192.0.2.11");
        restorer(&server, Fleet::from_parts(vec![node])).save("").await.unwrap();
        // The filesystem was flushed before the capture.
        assert!(exec.saw("sync"));
    }

    #[tokio::test]
    async fn test_save_reuses_existing_snapshot() {
        let server = MockServer::start().await;
        mount_instances(&server).await;
        Mock::given(method("GET"))
            .and(path("/images"))
            .and(query_param("name", "shakedown-snapshot_data1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "images": [{"id": "img-1", "name": "shakedown-snapshot_data1",
                            "status": "ACTIVE"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/images/img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image": {"id": "img-1", "name": "shakedown-snapshot_data1", "status": "ACTIVE"}
            })))
            .mount(&server)
            .await;
        // No capture request may be issued.
        Mock::given(method("POST"))
            .and(path("/servers/i-1/action"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let (node, _exec) = fleet_node("data1", "192.0.2.11");
        restorer(&server, Fleet::from_parts(vec![node])).save("").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_rejects_colliding_names() {
        let server = MockServer::start().await;
        // Two nodes whose short names collide. No compute request is ever
        // made: the collision is caught before anything is created.
        let (a, _) = fleet_node("data1", "192.0.2.11");
        let (b, _) = fleet_node("data1", "192.0.2.12");
        let err = restorer(&server, Fleet::from_parts(vec![a, b])).save("").await.unwrap_err();
        assert!(matches!(err, RestoreError::SnapshotCollision { .. }));
    }

    #[tokio::test]
    async fn test_tag_appended_to_snapshot_name() {
        let server = MockServer::start().await;
        let (node, _) = fleet_node("data1", "192.0.2.11");
        let r = restorer(&server, Fleet::from_parts(vec![node]));
        let names = r.snapshot_names("before-disk-tests").unwrap();
        assert_eq!(names, vec!["shakedown-snapshot_data1_before-disk-tests"]);
    }

    #[tokio::test]
    async fn test_load_without_save_is_not_found() {
        let server = MockServer::start().await;
        mount_instances(&server).await;
        mount_no_image(&server, "shakedown-snapshot_data1").await;

        let (node, _exec) = fleet_node("data1", "192.0.2.11");
        let err = restorer(&server, Fleet::from_parts(vec![node])).load("").await.unwrap_err();
        assert!(matches!(err, RestoreError::SnapshotNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_rebuilds_and_probes_sessions() {
        let server = MockServer::start().await;
        mount_instances(&server).await;
        Mock::given(method("GET"))
            .and(path("/images"))
            .and(query_param("name", "shakedown-snapshot_data1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "images": [{"id": "img-1", "name": "shakedown-snapshot_data1",
                            "status": "ACTIVE"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/servers/i-1/action"))
            .and(body_partial_json(serde_json::json!({"rebuild": {"imageRef": "img-1"}})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/i-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "server": {"id": "i-1", "name": "data1", "status": "ACTIVE",
                           "addresses": {"private": ["192.0.2.11"]}}
            })))
            .mount(&server)
            .await;

        let (node, exec) = fleet_node("data1", "192.0.2.11");
        restorer(&server, Fleet::from_parts(vec![node])).load("").await.unwrap();
        // The readiness probe ran against the rebuilt node.
        assert!(exec.saw("true"));
    }

    #[tokio::test]
    async fn test_ambiguous_ip_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "servers": [
                    {"id": "i-1", "name": "a", "status": "ACTIVE",
                     "addresses": {"net": ["192.0.2.11"]}},
                    {"id": "i-2", "name": "b", "status": "ACTIVE",
                     "addresses": {"other": ["192.0.2.11"]}}
                ]
            })))
            .mount(&server)
            .await;
        mount_no_image(&server, "shakedown-snapshot_data1").await;

        let (node, _exec) = fleet_node("data1", "192.0.2.11");
        let err = restorer(&server, Fleet::from_parts(vec![node])).save("").await.unwrap_err();
        assert!(matches!(err, RestoreError::AmbiguousInstance { .. }));
    }

    #[tokio::test]
    async fn test_explicit_instance_id_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/i-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "server": {"id": "i-7", "name": "data1", "status": "ACTIVE"}
            })))
            .mount(&server)
            .await;

        let (mut node, _exec) = fleet_node("data1", "192.0.2.11");
        node.node.instance_id = Some("i-7".to_string());
        let r = restorer(&server, Fleet::from_parts(vec![node]));
        let id = r.resolve_instance(&r.fleet.all()[0]).await.unwrap();
        assert_eq!(id, "i-7");
    }

    #[tokio::test]
    async fn test_image_poll_times_out() {
        let server = MockServer::start().await;
        mount_instances(&server).await;
        mount_no_image(&server, "shakedown-snapshot_data1").await;
        Mock::given(method("POST"))
            .and(path("/servers/i-1/action"))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Location", "http://cloud/images/img-1"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/images/img-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "image": {"id": "img-1", "name": "shakedown-snapshot_data1", "status": "SAVING"}
            })))
            .mount(&server)
            .await;

        let (node, _exec) = fleet_node("data1", "192.0.2.11");
        let compute = Arc::new(HttpComputeClient::new(&server.uri(), "secret"));
        let r = SnapshotRestorer::new(
            compute,
            Arc::new(Fleet::from_parts(vec![node])),
            &management(0, 0),
        );
        let err = r.save("").await.unwrap_err();
        assert!(matches!(err, RestoreError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_snapshot() {
        let server = MockServer::start().await;
        mount_no_image(&server, "shakedown-snapshot_data1").await;

        let (node, _exec) = fleet_node("data1", "192.0.2.11");
        restorer(&server, Fleet::from_parts(vec![node])).delete("").await.unwrap();
    }
}
