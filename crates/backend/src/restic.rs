// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restic backend
//!
//! Shells out to the `restic` binary with the instance environment
//! (repository location and password included). Every invocation is
//! bounded by the per-instance timeout.

use crate::subprocess::{combined_output, run_with_timeout};
use crate::BackendError;
use marina_core::Retention;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ResticBackend {
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ResticBackend {
    pub fn new(env: Vec<(String, String)>, timeout: Duration) -> Self {
        Self { env, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Initialize the repository unless it already answers `snapshots`.
    pub async fn init(&self) -> Result<(), BackendError> {
        let (ok, _) = self.run(&["snapshots".to_string()]).await?;
        if ok {
            return Ok(());
        }
        let (ok, output) = self.run(&["init".to_string()]).await?;
        if ok {
            Ok(())
        } else {
            Err(BackendError::Init(output))
        }
    }

    pub async fn backup(
        &self,
        paths: &[PathBuf],
        tags: &[String],
    ) -> Result<String, BackendError> {
        let (ok, output) = self.run(&backup_args(paths, tags)).await?;
        if ok {
            Ok(output)
        } else {
            Err(BackendError::Backup(output))
        }
    }

    pub async fn apply_retention(&self, retention: Retention) -> Result<String, BackendError> {
        // all buckets zero: nothing to enforce, and a bare `forget --prune`
        // would drop every snapshot
        if retention.is_empty() {
            return Ok(String::new());
        }
        let (ok, output) = self.run(&retention_args(retention)).await?;
        if ok {
            Ok(output)
        } else {
            Err(BackendError::Retention(output))
        }
    }

    async fn run(&self, args: &[String]) -> Result<(bool, String), BackendError> {
        let mut cmd = Command::new("restic");
        cmd.args(args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        let output = run_with_timeout(cmd, self.timeout).await?;
        Ok((output.status.success(), combined_output(&output)))
    }
}

fn backup_args(paths: &[PathBuf], tags: &[String]) -> Vec<String> {
    let mut args = vec![
        "--cleanup-cache".to_string(),
        "backup".to_string(),
        "--verbose".to_string(),
    ];
    args.extend(paths.iter().map(|p| p.display().to_string()));
    for tag in tags {
        args.push("--tag".to_string());
        args.push(tag.clone());
    }
    args
}

fn retention_args(retention: Retention) -> Vec<String> {
    let mut args = vec!["forget".to_string(), "--prune".to_string()];
    for (flag, value) in [
        ("--keep-daily", retention.keep_daily),
        ("--keep-weekly", retention.keep_weekly),
        ("--keep-monthly", retention.keep_monthly),
    ] {
        if value > 0 {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }
    args
}

#[cfg(test)]
#[path = "restic_tests.rs"]
mod tests;
