// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Configuration loading for Marina
//!
//! YAML with environment-variable interpolation (`${VAR}` or `$VAR`),
//! applied to every string field before validation. The raw file model
//! is validated into the typed [`Config`] the rest of the system
//! consumes.

mod duration;
mod interpolate;
mod model;

pub use duration::parse_duration;
pub use interpolate::interpolate;
pub use model::{BackendConfig, Config, InstanceConfig, TargetConfig};

use std::path::Path;
use thiserror::Error;

/// Errors loading or validating configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("instance id must be non-empty")]
    EmptyInstanceId,
    #[error("duplicate instance id: {0}")]
    DuplicateInstanceId(String),
    #[error("instance {0}: set exactly one of repository or customImage")]
    BackendChoice(String),
    #[error("instance {instance}: target sets exactly one of volume or db")]
    TargetChoice { instance: String },
    #[error("instance {instance}: invalid retention: {source}")]
    Retention {
        instance: String,
        source: marina_core::RetentionParseError,
    },
    #[error("invalid default retention: {0}")]
    DefaultRetention(marina_core::RetentionParseError),
    #[error("invalid duration {value:?}: {reason}")]
    Duration { value: String, reason: String },
    #[error("instance {instance}: unknown db kind: {kind}")]
    UnknownDbKind { instance: String, kind: String },
    #[error("instance {instance}: volume target has empty paths")]
    EmptyPaths { instance: String },
}

/// Load, interpolate, and validate a configuration file.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    load_str(&raw)
}

/// Like [`load`], from an in-memory string.
pub fn load_str(raw: &str) -> Result<Config, ConfigError> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(raw)?;
    interpolate(&mut value, &|name| std::env::var(name).ok());
    let file: model::RawConfig = serde_yaml::from_value(value)?;
    Config::from_raw(file)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
