//! The compute control-plane capability the snapshot strategy depends on.
//!
//! Modeled as a trait so the snapshot restorer never knows which cloud it
//! is talking to; [`crate::HttpComputeClient`] is the real implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// State string the control plane reports for ready images and running
/// instances.
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// A compute instance as the control plane sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    /// Control-plane instance ID.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Current state (`ACTIVE`, `REBUILD`, ...).
    pub status: String,
    /// Attached addresses, keyed by network name.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<String>>,
}

impl Instance {
    /// Whether the instance is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ACTIVE)
    }

    /// Whether any attached network carries the given address.
    #[must_use]
    pub fn has_address(&self, ip: &str) -> bool {
        self.addresses.values().flatten().any(|a| a == ip)
    }
}

/// A snapshot image as the control plane sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    /// Control-plane image ID.
    pub id: String,
    /// Image name.
    pub name: String,
    /// Current state (`ACTIVE`, `SAVING`, ...).
    pub status: String,
}

impl Image {
    /// Whether the image is ready to rebuild from.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ACTIVE)
    }
}

/// The snapshot backend protocol: what the snapshot strategy needs from a
/// cloud control plane, and nothing more.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Lists all instances visible to the configured credentials, including
    /// their attached networks.
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Fetches one instance by ID.
    async fn instance(&self, id: &str) -> Result<Instance>;

    /// Requests an image capture of an instance. Returns the image ID.
    async fn create_image(&self, instance_id: &str, name: &str) -> Result<String>;

    /// Fetches one image by ID.
    async fn image(&self, id: &str) -> Result<Image>;

    /// Finds an image by exact name. `None` when it does not exist.
    async fn find_image(&self, name: &str) -> Result<Option<Image>>;

    /// Requests an instance rebuild from an image.
    async fn rebuild(&self, instance_id: &str, image_id: &str) -> Result<()>;

    /// Deletes an image.
    async fn delete_image(&self, id: &str) -> Result<()>;
}
