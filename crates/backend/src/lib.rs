// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Backup backends
//!
//! A backend turns a set of staged paths into a snapshot and prunes old
//! snapshots by retention policy. The set is sealed: a Restic repository
//! or a user-supplied container image.

mod custom_image;
mod restic;
mod subprocess;

pub use custom_image::CustomImageBackend;
pub use restic::ResticBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackupCall, FakeBackend};

use marina_core::Retention;
use marina_runtime::RuntimeError;
use marina_store::JobLogger;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from backend invocations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("init failed: {0}")]
    Init(String),
    #[error("backup failed: {0}")]
    Backup(String),
    #[error("retention failed: {0}")]
    Retention(String),
    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Restic,
    CustomImage,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Restic => write!(f, "restic"),
            BackendKind::CustomImage => write!(f, "customImage"),
        }
    }
}

/// The sealed backend set.
///
/// An enum rather than a trait object: the runner must know whether a
/// backend accepts a live job logger, which the variant expresses
/// directly.
#[derive(Clone)]
pub enum Backend {
    Restic(ResticBackend),
    CustomImage(CustomImageBackend),
    #[cfg(any(test, feature = "test-support"))]
    Fake(FakeBackend),
}

impl Backend {
    /// Prepare the repository/image. Idempotent.
    pub async fn init(&self) -> Result<(), BackendError> {
        match self {
            Backend::Restic(b) => b.init().await,
            Backend::CustomImage(b) => b.init().await,
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(b) => b.init().await,
        }
    }

    /// Produce one snapshot from the staged paths. Returns the captured
    /// invocation output.
    pub async fn backup(
        &self,
        paths: &[PathBuf],
        tags: &[String],
    ) -> Result<String, BackendError> {
        match self {
            Backend::Restic(b) => b.backup(paths, tags).await,
            Backend::CustomImage(b) => b.backup().await,
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(b) => b.backup(paths, tags).await,
        }
    }

    /// Apply the retention policy. A no-op for custom images, which own
    /// their retention.
    pub async fn apply_retention(&self, retention: Retention) -> Result<String, BackendError> {
        match self {
            Backend::Restic(b) => b.apply_retention(retention).await,
            Backend::CustomImage(_) => Ok(String::new()),
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(b) => b.apply_retention(retention).await,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Restic(_) => BackendKind::Restic,
            Backend::CustomImage(_) => BackendKind::CustomImage,
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(_) => BackendKind::Restic,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Backend::CustomImage(b) => Some(b.image()),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Backend::Restic(b) => b.timeout(),
            Backend::CustomImage(b) => b.timeout(),
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(b) => b.timeout(),
        }
    }

    /// Whether this backend forwards live output to a job logger.
    pub fn wants_logger(&self) -> bool {
        matches!(self, Backend::CustomImage(_))
    }

    /// Attach a job-scoped logger for live output forwarding.
    /// Only the custom-image backend consumes it.
    pub fn set_logger(&mut self, logger: JobLogger) {
        match self {
            Backend::CustomImage(b) => b.set_logger(logger),
            #[cfg(any(test, feature = "test-support"))]
            Backend::Fake(b) => b.set_logger(logger),
            _ => {}
        }
    }
}
