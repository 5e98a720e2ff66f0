// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker implementation of [`ContainerRuntime`] via bollard

use crate::{ContainerInfo, ContainerRuntime, ContainerSpec, LogChunk, MountInfo, RuntimeError, VolumeInfo};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, ListContainersOptions,
    LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::PathBuf;

/// Seconds Docker waits between SIGTERM and SIGKILL on stop.
const STOP_TIMEOUT_SECS: i64 = 10;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect with the local platform defaults (unix socket).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Our own container id: Docker sets the container hostname to the
    /// short id unless overridden.
    fn own_container_id() -> Result<String, RuntimeError> {
        if let Ok(hostname) = std::env::var("HOSTNAME") {
            if !hostname.is_empty() {
                return Ok(hostname);
            }
        }
        match std::fs::read_to_string("/etc/hostname") {
            Ok(contents) if !contents.trim().is_empty() => Ok(contents.trim().to_string()),
            Ok(_) => Err(RuntimeError::OwnIdentity("empty /etc/hostname".to_string())),
            Err(e) => Err(RuntimeError::OwnIdentity(e.to_string())),
        }
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn mount_from_summary(mount: &bollard::models::MountPoint) -> MountInfo {
    MountInfo {
        volume_name: mount.name.clone().filter(|n| !n.is_empty()),
        source: mount.source.clone().unwrap_or_default(),
        destination: mount.destination.clone().unwrap_or_default(),
        read_only: !mount.rw.unwrap_or(true),
    }
}

fn strip_name(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).to_string()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .as_deref()
                    .and_then(|names| names.first())
                    .map(|n| strip_name(n))
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                running: c.state.as_deref() == Some("running"),
                mounts: c
                    .mounts
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(mount_from_summary)
                    .collect(),
            })
            .collect())
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(name_or_id, None)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::ContainerNotFound(name_or_id.to_string())
                } else {
                    e.into()
                }
            })?;
        Ok(ContainerInfo {
            id: inspect.id.unwrap_or_default(),
            name: inspect.name.as_deref().map(strip_name).unwrap_or_default(),
            image: inspect
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            running: inspect
                .state
                .as_ref()
                .and_then(|s| s.running)
                .unwrap_or(false),
            mounts: inspect
                .mounts
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(mount_from_summary)
                .collect(),
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo, RuntimeError> {
        let volume = self.docker.inspect_volume(name).await.map_err(|e| {
            if is_not_found(&e) {
                RuntimeError::VolumeNotFound(name.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(VolumeInfo {
            name: volume.name,
            mountpoint: volume.mountpoint,
        })
    }

    async fn exec(&self, container: &str, command: &str) -> Result<String, RuntimeError> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(vec!["/bin/sh", "-c", command]),
            ..Default::default()
        };
        let exec = self.docker.create_exec(container, options).await?;

        let mut combined = String::new();
        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk? {
                        LogOutput::StdOut { message }
                        | LogOutput::StdErr { message }
                        | LogOutput::Console { message } => {
                            combined.push_str(&String::from_utf8_lossy(&message));
                        }
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(0);
        if exit_code != 0 {
            return Err(RuntimeError::ExecFailed {
                exit_code,
                output: combined,
            });
        }
        Ok(combined)
    }

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError> {
        Ok(self.inspect_container(container).await?.running)
    }

    async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(container, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await?;
        Ok(())
    }

    async fn start(&self, container: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress?;
        }
        Ok(())
    }

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions::<&str> {
            name: &spec.name,
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image),
            cmd: Some(spec.cmd),
            env: Some(spec.env),
            host_config: Some(HostConfig {
                binds: Some(spec.binds),
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container::<&str, String>(Some(options), config)
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a nonzero exit as a wait error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Other(format!(
                "wait stream for {id} closed without a status"
            ))),
        }
    }

    fn follow_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, RuntimeError>> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        self.docker
            .logs(id, Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(LogChunk {
                            stderr: false,
                            data: message,
                        }))
                    }
                    Ok(LogOutput::StdErr { message }) => Some(Ok(LogChunk {
                        stderr: true,
                        data: message,
                    })),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(e.into())),
                }
            })
            .boxed()
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    fn copy_from_container(
        &self,
        id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, RuntimeError>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        self.docker
            .download_from_container(id, Some(options))
            .map(|item| item.map_err(RuntimeError::from))
            .boxed()
    }

    async fn detect_own_mount(&self, destination: &str) -> Result<PathBuf, RuntimeError> {
        let own_id = Self::own_container_id()?;
        let info = self.inspect_container(&own_id).await?;
        let mount = info
            .mounts
            .iter()
            .find(|m| m.destination == destination)
            .ok_or_else(|| RuntimeError::MissingMount {
                destination: destination.to_string(),
            })?;
        if mount.volume_name.is_some() {
            return Err(RuntimeError::NotABindMount {
                destination: destination.to_string(),
            });
        }
        Ok(PathBuf::from(&mount.source))
    }
}
