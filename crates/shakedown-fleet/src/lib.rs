// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Fleet registry and disk fault injection.
//!
//! A [`Fleet`] holds every node the harness knows about, each tagged with
//! capability roles and an ordered list of managed disk devices. Disk fault
//! injection — force-unmounting a device, reformatting it, bringing it back —
//! lives on [`FleetNode`], built on nothing but the node's executor and its
//! managed disk list.

mod disk;
pub mod error;
mod fleet;
mod node;

pub use error::{FaultError, Result};
pub use fleet::{Fleet, FleetNode};
pub use node::Node;
pub use shakedown_core::config::Role;
