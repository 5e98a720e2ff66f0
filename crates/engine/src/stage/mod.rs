// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging pipeline
//!
//! Materializes each target's data into an isolated, job-scoped
//! directory under the staging mount. Every acquired resource registers
//! a cleanup callback; a failing step drains its own callbacks before
//! returning so nothing leaks even on the error path.

mod db;
mod volume;

pub(crate) use db::stage_database;
pub(crate) use volume::stage_volume;

use marina_runtime::RuntimeError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Per-target staging failure. Contributes to `partial_success`;
/// remaining targets still stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("volume not found: {0}")]
    VolumeNotFound(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("no container attached to volume {0} to run hooks in")]
    NoAttachedContainer(String),
    #[error("pre-hook failed: {0}")]
    PreHook(String),
    #[error("dump command failed: {0}")]
    Dump(String),
    #[error("staged output contains no non-empty file")]
    EmptyStage,
    #[error("archive from container contained no file")]
    EmptyArchive,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// The two views of the staging tree: `host_root` is the host-side path
/// used in bind mounts (from `detect_own_mount`); `local_root` is the
/// same directory as this process sees it.
#[derive(Debug, Clone)]
pub struct StagePaths {
    pub host_root: PathBuf,
    pub local_root: PathBuf,
}

impl StagePaths {
    pub fn new(host_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            host_root: host_root.into(),
            local_root: local_root.into(),
        }
    }
}

/// True when at least one non-empty regular file exists under `path`.
pub(crate) fn has_nonempty_file(path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        // a staged path may be a single file
        return path
            .metadata()
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_file() && metadata.len() > 0 {
            return true;
        }
        if metadata.is_dir() && has_nonempty_file(&entry_path) {
            return true;
        }
    }
    false
}

/// Extract the first regular file of a tar archive to `dest`.
/// Returns `(bytes_written, header_size)`.
pub(crate) fn extract_single_file(
    tar_bytes: &[u8],
    dest: &Path,
) -> Result<(u64, u64), StageError> {
    let mut archive = tar::Archive::new(tar_bytes);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let header_size = entry.header().size()?;
        let mut out = std::fs::File::create(dest)?;
        let written = std::io::copy(&mut entry, &mut out)?;
        return Ok((written, header_size));
    }
    Err(StageError::EmptyArchive)
}

/// Quote a path for interpolation into `sh -c`.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
