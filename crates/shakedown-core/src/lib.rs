// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Core types for shakedown.
//!
//! This crate holds the configuration surface shared by every other crate in
//! the workspace: the fleet topology, the management (state restoration)
//! selector, the storage endpoint under test, and the on-disk layout of the
//! storage service.

pub mod config;
pub mod error;

pub use config::{
    Config, LogFormat, LoggingConfig, ManagementConfig, ManagementType, NodeConfig, Role,
    ServiceLayout, StorageConfig,
};
pub use error::{ConfigError, Result};
