// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container runtime for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{
    ContainerInfo, ContainerRuntime, ContainerSpec, LogChunk, RuntimeError, VolumeInfo,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Recorded runtime operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Stop(String),
    Start(String),
    Exec { container: String, command: String },
    PullImage(String),
    CreateContainer { name: String, image: String },
    StartContainer(String),
    WaitContainer(String),
    RemoveContainer(String),
    CopyFrom { container: String, path: String },
}

/// Scripted exec outcome: output on success, `(exit_code, output)` on failure.
pub type ExecResult = Result<String, (i64, String)>;
type ExecHandler = dyn Fn(&str, &str) -> Option<ExecResult> + Send + Sync;

#[derive(Default)]
struct FakeState {
    containers: Vec<ContainerInfo>,
    volumes: HashMap<String, VolumeInfo>,
    images: Vec<String>,
    calls: Vec<RuntimeCall>,
    exec_scripts: Vec<(String, ExecResult)>,
    log_scripts: HashMap<String, Vec<LogChunk>>,
    copy_scripts: HashMap<String, Vec<u8>>,
    wait_codes: HashMap<String, i64>,
    own_mount: Option<PathBuf>,
    fail_pull: bool,
    fail_volume_inspect: bool,
    next_id: u64,
}

/// Fake [`ContainerRuntime`] for testing: seeded state, scripted
/// responses, and a full call log for assertions.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Mutex<FakeState>>,
    exec_handler: Arc<Mutex<Option<Box<ExecHandler>>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, container: ContainerInfo) {
        self.inner.lock().containers.push(container);
    }

    pub fn add_volume(&self, name: &str) {
        self.inner.lock().volumes.insert(
            name.to_string(),
            VolumeInfo {
                name: name.to_string(),
                mountpoint: format!("/var/lib/docker/volumes/{name}/_data"),
            },
        );
    }

    pub fn add_image(&self, image: &str) {
        self.inner.lock().images.push(image.to_string());
    }

    pub fn set_own_mount(&self, path: impl Into<PathBuf>) {
        self.inner.lock().own_mount = Some(path.into());
    }

    /// Script the result of any exec whose command contains `pattern`.
    /// Scripts are checked in insertion order, before the default `Ok("")`.
    pub fn script_exec(&self, pattern: &str, result: Result<&str, (i64, &str)>) {
        self.inner.lock().exec_scripts.push((
            pattern.to_string(),
            result
                .map(str::to_string)
                .map_err(|(code, out)| (code, out.to_string())),
        ));
    }

    /// Install a handler consulted for every exec before scripts. Lets
    /// tests simulate command side effects (e.g. creating staged files).
    pub fn set_exec_handler(
        &self,
        handler: impl Fn(&str, &str) -> Option<ExecResult> + Send + Sync + 'static,
    ) {
        *self.exec_handler.lock() = Some(Box::new(handler));
    }

    pub fn script_logs(&self, container: &str, chunks: Vec<LogChunk>) {
        self.inner
            .lock()
            .log_scripts
            .insert(container.to_string(), chunks);
    }

    /// Script the tar archive streamed for a copy whose source path
    /// contains `pattern`.
    pub fn script_copy(&self, pattern: &str, tar_bytes: Vec<u8>) {
        self.inner
            .lock()
            .copy_scripts
            .insert(pattern.to_string(), tar_bytes);
    }

    pub fn script_wait(&self, container: &str, exit_code: i64) {
        self.inner
            .lock()
            .wait_codes
            .insert(container.to_string(), exit_code);
    }

    pub fn fail_pulls(&self) {
        self.inner.lock().fail_pull = true;
    }

    pub fn fail_volume_inspects(&self) {
        self.inner.lock().fail_volume_inspect = true;
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.lock().calls.clone()
    }

    pub fn container_running(&self, name_or_id: &str) -> Option<bool> {
        self.inner
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
            .map(|c| c.running)
    }

    fn record(&self, call: RuntimeCall) {
        self.inner.lock().calls.push(call);
    }

    fn find(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        self.inner
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
            .cloned()
            .ok_or_else(|| RuntimeError::ContainerNotFound(name_or_id.to_string()))
    }

    fn set_running(&self, name_or_id: &str, running: bool) -> Result<(), RuntimeError> {
        let mut state = self.inner.lock();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(name_or_id.to_string()))?;
        container.running = running;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        Ok(self.inner.lock().containers.clone())
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        self.find(name_or_id)
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo, RuntimeError> {
        if self.inner.lock().fail_volume_inspect {
            return Err(RuntimeError::VolumeNotFound(name.to_string()));
        }
        self.inner
            .lock()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::VolumeNotFound(name.to_string()))
    }

    async fn exec(&self, container: &str, command: &str) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::Exec {
            container: container.to_string(),
            command: command.to_string(),
        });

        let handled = self
            .exec_handler
            .lock()
            .as_ref()
            .and_then(|h| h(container, command));
        let result = match handled {
            Some(result) => Some(result),
            None => self
                .inner
                .lock()
                .exec_scripts
                .iter()
                .find(|(pattern, _)| command.contains(pattern.as_str()))
                .map(|(_, result)| result.clone()),
        };
        match result {
            Some(Ok(output)) => Ok(output),
            Some(Err((exit_code, output))) => Err(RuntimeError::ExecFailed { exit_code, output }),
            None => Ok(String::new()),
        }
    }

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError> {
        Ok(self.find(container)?.running)
    }

    async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Stop(container.to_string()));
        self.set_running(container, false)
    }

    async fn start(&self, container: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Start(container.to_string()));
        self.set_running(container, true)
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::PullImage(image.to_string()));
        if self.inner.lock().fail_pull {
            return Err(RuntimeError::Other(format!("pull failed: {image}")));
        }
        self.inner.lock().images.push(image.to_string());
        Ok(())
    }

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.inner.lock().images.iter().any(|i| i == image))
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::CreateContainer {
            name: spec.name.clone(),
            image: spec.image.clone(),
        });
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.push(ContainerInfo {
            id: id.clone(),
            name: spec.name,
            image: spec.image,
            running: false,
            mounts: Vec::new(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::StartContainer(id.to_string()));
        self.set_running(id, true)
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        self.record(RuntimeCall::WaitContainer(id.to_string()));
        Ok(self.inner.lock().wait_codes.get(id).copied().unwrap_or(0))
    }

    fn follow_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, RuntimeError>> {
        let chunks = self
            .inner
            .lock()
            .log_scripts
            .get(id)
            .cloned()
            .unwrap_or_default();
        Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveContainer(id.to_string()));
        let mut state = self.inner.lock();
        state.containers.retain(|c| c.id != id && c.name != id);
        Ok(())
    }

    fn copy_from_container(
        &self,
        id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, RuntimeError>> {
        self.record(RuntimeCall::CopyFrom {
            container: id.to_string(),
            path: path.to_string(),
        });
        let state = self.inner.lock();
        let bytes = state
            .copy_scripts
            .iter()
            .find(|(pattern, _)| path.contains(pattern.as_str()))
            .map(|(_, bytes)| bytes.clone());
        match bytes {
            Some(bytes) => Box::pin(futures::stream::once(async move {
                Ok(Bytes::from(bytes))
            })),
            None => Box::pin(futures::stream::once(async move {
                Err(RuntimeError::Other(
                    "no scripted copy for this path".to_string(),
                ))
            })),
        }
    }

    async fn detect_own_mount(&self, destination: &str) -> Result<PathBuf, RuntimeError> {
        self.inner
            .lock()
            .own_mount
            .clone()
            .ok_or_else(|| RuntimeError::MissingMount {
                destination: destination.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
