// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw file model and the validated [`Config`]

use crate::{duration::parse_duration, ConfigError};
use marina_core::{DbKind, InstanceId, Retention};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_DB_PATH: &str = "/var/lib/marina/marina.db";
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Raw top-level file model, pre-validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawConfig {
    #[serde(default)]
    pub instances: Vec<RawInstance>,
    pub retention: Option<String>,
    pub stop_attached: Option<bool>,
    pub restic_timeout: Option<String>,
    pub node_name: Option<String>,
    pub auth_password: Option<String>,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawInstance {
    pub id: String,
    pub repository: Option<String>,
    pub custom_image: Option<String>,
    pub schedule: String,
    /// BTreeMap so env ordering is deterministic when handed to backends.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub retention: Option<String>,
    pub restic_timeout: Option<String>,
    #[serde(default)]
    pub targets: Vec<RawTarget>,
}

/// Target shorthand: either an object or a `"volume:x"` / `"db:y"` string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTarget {
    Shorthand(String),
    Spec(RawTargetSpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTargetSpec {
    pub volume: Option<String>,
    pub db: Option<String>,
    pub paths: Option<Vec<String>>,
    pub stop_attached: Option<bool>,
    pub db_kind: Option<String>,
    #[serde(default)]
    pub dump_args: Vec<String>,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
}

/// Which backend an instance binds to. Exactly one per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Restic repository location (becomes `RESTIC_REPOSITORY`).
    Restic { repository: String },
    /// User-supplied backup container image.
    CustomImage { image: String },
}

/// A declared, not-yet-resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetConfig {
    Volume {
        name: String,
        paths: Vec<String>,
        /// None falls back to the global default at schedule build.
        stop_attached: Option<bool>,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    },
    Database {
        name: String,
        /// None is inferred from the container image at schedule build.
        kind: Option<DbKind>,
        dump_args: Vec<String>,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    },
}

/// One validated backup instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub id: InstanceId,
    pub backend: BackendConfig,
    /// Five-field cron expression; validated at schedule build.
    pub schedule: String,
    pub env: BTreeMap<String, String>,
    pub retention: Option<Retention>,
    pub backend_timeout: Option<Duration>,
    pub targets: Vec<TargetConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub instances: Vec<InstanceConfig>,
    pub default_retention: Retention,
    pub default_stop_attached: bool,
    pub default_backend_timeout: Duration,
    pub node_name: Option<String>,
    /// Empty or absent disables operator auth.
    pub auth_password: Option<String>,
    pub peers: Vec<String>,
    pub cors_origins: Vec<String>,
    pub db_path: PathBuf,
}

impl Config {
    pub(crate) fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let default_retention = match &raw.retention {
            Some(s) => s.parse().map_err(ConfigError::DefaultRetention)?,
            None => Retention::default(),
        };
        let default_backend_timeout = match &raw.restic_timeout {
            Some(s) => parse_duration(s)?,
            None => DEFAULT_BACKEND_TIMEOUT,
        };

        let mut seen = HashSet::new();
        let mut instances = Vec::with_capacity(raw.instances.len());
        for instance in raw.instances {
            let instance = validate_instance(instance)?;
            if !seen.insert(instance.id.clone()) {
                return Err(ConfigError::DuplicateInstanceId(instance.id.to_string()));
            }
            instances.push(instance);
        }

        Ok(Config {
            instances,
            default_retention,
            default_stop_attached: raw.stop_attached.unwrap_or(false),
            default_backend_timeout,
            node_name: none_if_empty(raw.node_name),
            auth_password: none_if_empty(raw.auth_password),
            peers: raw.peers,
            cors_origins: raw.cors_origins,
            db_path: raw.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.into()),
        })
    }
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn validate_instance(raw: RawInstance) -> Result<InstanceConfig, ConfigError> {
    if raw.id.is_empty() {
        return Err(ConfigError::EmptyInstanceId);
    }

    let backend = match (raw.repository, raw.custom_image) {
        (Some(repository), None) => BackendConfig::Restic { repository },
        (None, Some(image)) => BackendConfig::CustomImage { image },
        _ => return Err(ConfigError::BackendChoice(raw.id)),
    };

    let retention = match &raw.retention {
        Some(s) => Some(s.parse().map_err(|source| ConfigError::Retention {
            instance: raw.id.clone(),
            source,
        })?),
        None => None,
    };
    let backend_timeout = match &raw.restic_timeout {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let mut targets = Vec::with_capacity(raw.targets.len());
    for target in raw.targets {
        targets.push(validate_target(&raw.id, target)?);
    }

    Ok(InstanceConfig {
        id: InstanceId::new(raw.id),
        backend,
        schedule: raw.schedule,
        env: raw.env,
        retention,
        backend_timeout,
        targets,
    })
}

fn validate_target(instance: &str, raw: RawTarget) -> Result<TargetConfig, ConfigError> {
    let spec = match raw {
        RawTarget::Shorthand(s) => match s.split_once(':') {
            Some(("volume", name)) if !name.is_empty() => {
                return Ok(TargetConfig::Volume {
                    name: name.to_string(),
                    paths: default_paths(),
                    stop_attached: None,
                    pre_hook: None,
                    post_hook: None,
                })
            }
            Some(("db", name)) if !name.is_empty() => {
                return Ok(TargetConfig::Database {
                    name: name.to_string(),
                    kind: None,
                    dump_args: Vec::new(),
                    pre_hook: None,
                    post_hook: None,
                })
            }
            _ => {
                return Err(ConfigError::TargetChoice {
                    instance: instance.to_string(),
                })
            }
        },
        RawTarget::Spec(spec) => spec,
    };

    match (spec.volume, spec.db) {
        (Some(name), None) => {
            let paths = match spec.paths {
                None => default_paths(),
                Some(paths) if paths.is_empty() => {
                    return Err(ConfigError::EmptyPaths {
                        instance: instance.to_string(),
                    })
                }
                Some(paths) => paths,
            };
            Ok(TargetConfig::Volume {
                name,
                paths,
                stop_attached: spec.stop_attached,
                pre_hook: spec.pre_hook,
                post_hook: spec.post_hook,
            })
        }
        (None, Some(name)) => {
            let kind = match spec.db_kind {
                Some(kind) => Some(kind.parse().map_err(|_| ConfigError::UnknownDbKind {
                    instance: instance.to_string(),
                    kind,
                })?),
                None => None,
            };
            Ok(TargetConfig::Database {
                name,
                kind,
                dump_args: spec.dump_args,
                pre_hook: spec.pre_hook,
                post_hook: spec.post_hook,
            })
        }
        _ => Err(ConfigError::TargetChoice {
            instance: instance.to_string(),
        }),
    }
}

fn default_paths() -> Vec<String> {
    vec!["/".to_string()]
}
