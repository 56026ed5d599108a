// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Fleet state capture and restoration.
//!
//! Fault injection damages the system under test, so there has to be some
//! isolation between scenarios: a failure caused by one test must not bleed
//! into the next. This crate captures a point-in-time baseline of the fleet
//! and rolls back to it, through one of three interchangeable strategies:
//!
//! * [`NoopRestorer`] — do nothing; the caller accepts that scenarios are
//!   not isolated.
//! * [`ManualRestorer`] — file-level backup and restore of the storage
//!   service's state. Best effort: it restores what it knows about and
//!   nothing else.
//! * [`SnapshotRestorer`] — image snapshots of cloud VMs, rebuilt between
//!   scenarios. The most thorough option, but requires the nodes to be VMs
//!   managed by a compute API.
//!
//! The strategy is selected once at startup from configuration and held as
//! a single `Box<dyn StateRestorer>` for the process lifetime.

mod compute;
pub mod error;
mod http;
mod manual;
mod noop;
mod snapshot;

use async_trait::async_trait;
pub use compute::{ComputeApi, Image, Instance};
pub use error::{RestoreError, Result};
pub use http::HttpComputeClient;
pub use manual::ManualRestorer;
pub use noop::NoopRestorer;
use shakedown_core::config::{ManagementConfig, ManagementType, ServiceLayout};
use shakedown_fleet::Fleet;
pub use snapshot::SnapshotRestorer;
use std::sync::Arc;

/// Captures and restores a point-in-time baseline of the fleet.
///
/// The state machine is the same for every strategy:
/// `absent → (save) → captured → (load)* → captured → (delete) → absent`.
/// `load` never consumes the baseline; a scenario can restore it any number
/// of times.
#[async_trait]
pub trait StateRestorer: Send + Sync {
    /// Captures the current state under the given tag.
    ///
    /// Calling `save` when a baseline of the same computed name already
    /// exists reuses it (with a warning) rather than failing — a previous
    /// run may have died between `save` and `delete`.
    async fn save(&self, tag: &str) -> Result<()>;

    /// Restores the most recent `save` with the matching tag.
    ///
    /// # Errors
    ///
    /// [`RestoreError::SnapshotNotFound`] when no matching save exists.
    async fn load(&self, tag: &str) -> Result<()>;

    /// Removes the saved state. Tolerant of "not found".
    async fn delete(&self, tag: &str) -> Result<()>;
}

/// Builds the restoration strategy selected by the configuration.
///
/// # Errors
///
/// [`RestoreError::Config`] when the snapshot backend is selected without
/// compute credentials. An unknown management type never reaches this
/// function: it is rejected at configuration parse time.
pub fn build_restorer(
    config: &ManagementConfig,
    layout: &ServiceLayout,
    fleet: Arc<Fleet>,
) -> Result<Box<dyn StateRestorer>> {
    match config.kind {
        ManagementType::None => Ok(Box::new(NoopRestorer::new())),
        ManagementType::Manual => {
            Ok(Box::new(ManualRestorer::new(fleet, layout.clone(), config)))
        }
        ManagementType::Snapshot => {
            let url = config.compute_url.as_deref().ok_or_else(|| {
                RestoreError::Config("snapshot backend needs management.compute_url".into())
            })?;
            let token = config.token.as_deref().ok_or_else(|| {
                RestoreError::Config("snapshot backend needs management.token".into())
            })?;
            let compute = Arc::new(HttpComputeClient::new(url, token));
            Ok(Box::new(SnapshotRestorer::new(compute, fleet, config)))
        }
    }
}
