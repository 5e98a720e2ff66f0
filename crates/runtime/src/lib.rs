// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Container runtime adapter
//!
//! [`ContainerRuntime`] is the only surface the orchestration core sees;
//! [`DockerRuntime`] implements it over the local Docker daemon.

mod docker;
mod types;

pub use docker::DockerRuntime;
pub use types::{ContainerInfo, ContainerSpec, LogChunk, MountInfo, VolumeInfo};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ExecResult, FakeRuntime, RuntimeCall};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from container runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("volume not found: {0}")]
    VolumeNotFound(String),
    #[error("command exited with status {exit_code}: {output}")]
    ExecFailed { exit_code: i64, output: String },
    #[error("no mount at {destination}")]
    MissingMount { destination: String },
    #[error("mount at {destination} is a managed volume, not a host bind")]
    NotABindMount { destination: String },
    #[error("cannot determine own container id: {0}")]
    OwnIdentity(String),
    #[error("{0}")]
    Other(String),
}

/// Abstraction over the container runtime.
///
/// All operations are best-effort views of mutable external state; the
/// caller owns retry and cleanup policy.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError>;

    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError>;

    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo, RuntimeError>;

    /// Run a shell command in a container, attached to stdout+stderr
    /// combined. A nonzero exit is an error carrying the combined output.
    async fn exec(&self, container: &str, command: &str) -> Result<String, RuntimeError>;

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError>;

    /// Stop with a 10-second timeout before the runtime kills.
    async fn stop(&self, container: &str) -> Result<(), RuntimeError>;

    async fn start(&self, container: &str) -> Result<(), RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Whether the image is already present locally.
    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Block until the container exits; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    /// Follow the container's demultiplexed stdout/stderr.
    fn follow_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, RuntimeError>>;

    /// Force-remove. Callers on cleanup paths ignore the result.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stream a path out of the container as a tar archive.
    fn copy_from_container(
        &self,
        id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, RuntimeError>>;

    /// Resolve the *host* path bind-mounted at `destination` in our own
    /// container. Fails when the destination is absent or backed by a
    /// managed volume.
    async fn detect_own_mount(&self, destination: &str) -> Result<PathBuf, RuntimeError>;
}
