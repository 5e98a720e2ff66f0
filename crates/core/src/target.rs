// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved backup targets
//!
//! These are the *resolved* forms produced by the schedule builder:
//! database targets carry the container id they were matched to and a
//! concrete [`DbKind`], volume targets a concrete `stop_attached`.

use crate::TargetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database engines with a defined dump command.
///
/// Image-name inference also recognizes `redis`, but redis has no dump
/// semantics here and is rejected at schedule build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Postgres,
    Mysql,
    Mariadb,
    Mongo,
}

impl DbKind {
    /// Infer a database kind from a container image name.
    ///
    /// Substring match in declaration order; `redis` is recognized but
    /// returns `None` (no dump command is defined for it).
    pub fn infer_from_image(image: &str) -> Option<DbKind> {
        for (needle, kind) in [
            ("postgres", Some(DbKind::Postgres)),
            // mariadb before mysql: "mariadb" images often mention mysql
            ("mariadb", Some(DbKind::Mariadb)),
            ("mysql", Some(DbKind::Mysql)),
            ("mongo", Some(DbKind::Mongo)),
            ("redis", None),
        ] {
            if image.contains(needle) {
                return kind;
            }
        }
        None
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbKind::Postgres => write!(f, "postgres"),
            DbKind::Mysql => write!(f, "mysql"),
            DbKind::Mariadb => write!(f, "mariadb"),
            DbKind::Mongo => write!(f, "mongo"),
        }
    }
}

impl FromStr for DbKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(DbKind::Postgres),
            "mysql" => Ok(DbKind::Mysql),
            "mariadb" => Ok(DbKind::Mariadb),
            "mongo" => Ok(DbKind::Mongo),
            other => Err(format!("unknown db kind: {other}")),
        }
    }
}

/// A named container volume to stage as a file subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTarget {
    pub name: String,
    /// Slash-relative paths inside the volume to stage. Never empty;
    /// defaults to `["/"]`.
    pub paths: Vec<String>,
    /// Stop attached containers (with writable mounts) during staging.
    pub stop_attached: bool,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
}

/// A named database container to stage as a logical dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTarget {
    /// Container name as declared in configuration.
    pub name: String,
    /// Container id the target resolved to in the runtime snapshot.
    pub container_id: String,
    pub kind: DbKind,
    pub dump_args: Vec<String>,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
}

/// A unit of data to stage: exactly one of a volume or a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum BackupTarget {
    Volume(VolumeTarget),
    #[serde(rename = "db")]
    Database(DatabaseTarget),
}

impl BackupTarget {
    pub fn id(&self) -> TargetId {
        match self {
            BackupTarget::Volume(v) => TargetId::volume(&v.name),
            BackupTarget::Database(d) => TargetId::database(&d.name, &d.container_id),
        }
    }

    /// Snapshot tag for a successfully staged target, `{type}:{name}`.
    pub fn tag(&self) -> String {
        match self {
            BackupTarget::Volume(v) => format!("volume:{}", v.name),
            BackupTarget::Database(d) => format!("db:{}", d.name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BackupTarget::Volume(v) => &v.name,
            BackupTarget::Database(d) => &d.name,
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
