// Copyright 2025 The Shakedown Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration errors.

use thiserror::Error;

/// A specialized `Result` for configuration handling.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating the harness configuration.
///
/// All of these are fatal at startup: a harness with a broken topology or an
/// unknown management type must refuse to run rather than fail halfway
/// through a scenario.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    Parse(String),

    /// The configuration parsed but does not describe a usable setup.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A node's hostname did not resolve to any address.
    #[error("hostname '{hostname}' does not resolve to an address")]
    UnresolvedHost {
        /// The hostname as given in the configuration.
        hostname: String,
    },
}
