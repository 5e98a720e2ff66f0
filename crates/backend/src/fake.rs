// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::BackendError;
use marina_core::Retention;
use marina_store::JobLogger;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Recorded backup invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupCall {
    pub paths: Vec<PathBuf>,
    pub tags: Vec<String>,
}

#[derive(Default)]
struct FakeBackendState {
    init_calls: u32,
    backup_calls: Vec<BackupCall>,
    retention_calls: Vec<Retention>,
    fail_backup: bool,
    fail_retention: bool,
    logger_attached: bool,
}

/// Fake backend recording invocations, with scriptable failures.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<FakeBackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_backups(&self) {
        self.inner.lock().fail_backup = true;
    }

    pub fn fail_retention(&self) {
        self.inner.lock().fail_retention = true;
    }

    pub fn init_calls(&self) -> u32 {
        self.inner.lock().init_calls
    }

    pub fn backup_calls(&self) -> Vec<BackupCall> {
        self.inner.lock().backup_calls.clone()
    }

    pub fn retention_calls(&self) -> Vec<Retention> {
        self.inner.lock().retention_calls.clone()
    }

    pub fn logger_attached(&self) -> bool {
        self.inner.lock().logger_attached
    }

    pub(crate) async fn init(&self) -> Result<(), BackendError> {
        self.inner.lock().init_calls += 1;
        Ok(())
    }

    pub(crate) async fn backup(
        &self,
        paths: &[PathBuf],
        tags: &[String],
    ) -> Result<String, BackendError> {
        let mut state = self.inner.lock();
        state.backup_calls.push(BackupCall {
            paths: paths.to_vec(),
            tags: tags.to_vec(),
        });
        if state.fail_backup {
            Err(BackendError::Backup("scripted backup failure".to_string()))
        } else {
            Ok("snapshot saved".to_string())
        }
    }

    pub(crate) async fn apply_retention(
        &self,
        retention: Retention,
    ) -> Result<String, BackendError> {
        let mut state = self.inner.lock();
        state.retention_calls.push(retention);
        if state.fail_retention {
            Err(BackendError::Retention(
                "scripted retention failure".to_string(),
            ))
        } else {
            Ok(String::new())
        }
    }

    pub(crate) fn set_logger(&self, _logger: JobLogger) {
        self.inner.lock().logger_attached = true;
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}
