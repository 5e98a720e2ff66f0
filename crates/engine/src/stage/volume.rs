// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume staging
//!
//! Copies the requested subtrees of a named volume into the staging
//! tree through a short-lived sidecar container that mounts the volume
//! read-only next to the staging bind.

use super::{has_nonempty_file, shell_quote, StageError, StagePaths};
use crate::CleanupStack;
use marina_core::{InstanceId, VolumeTarget};
use marina_runtime::{ContainerRuntime, ContainerSpec};
use marina_store::JobLogger;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Utility image for the staging sidecar.
const SIDECAR_IMAGE: &str = "alpine:3.20";
/// Keeps the sidecar alive long enough for the copies; it is stopped
/// explicitly as soon as they finish.
const SIDECAR_COMMAND: [&str; 2] = ["sleep", "300"];

pub(crate) async fn stage_volume(
    runtime: &Arc<dyn ContainerRuntime>,
    logger: &JobLogger,
    instance_id: &InstanceId,
    token: &str,
    paths: &StagePaths,
    target: &VolumeTarget,
) -> Result<(Vec<PathBuf>, CleanupStack), StageError> {
    let mut cleanup = CleanupStack::new();
    match run(runtime, logger, instance_id, token, paths, target, &mut cleanup).await {
        Ok(staged) => Ok((staged, cleanup)),
        Err(e) => {
            // release whatever this target already acquired
            cleanup.drain().await;
            Err(e)
        }
    }
}

async fn run(
    runtime: &Arc<dyn ContainerRuntime>,
    logger: &JobLogger,
    instance_id: &InstanceId,
    token: &str,
    paths: &StagePaths,
    target: &VolumeTarget,
    cleanup: &mut CleanupStack,
) -> Result<Vec<PathBuf>, StageError> {
    runtime
        .inspect_volume(&target.name)
        .await
        .map_err(|_| StageError::VolumeNotFound(target.name.clone()))?;

    let needs_attached =
        target.stop_attached || target.pre_hook.is_some() || target.post_hook.is_some();
    let attached = if needs_attached {
        runtime
            .list_containers()
            .await?
            .into_iter()
            .filter(|c| c.mounts_volume(&target.name))
            .collect()
    } else {
        Vec::new()
    };

    if let Some(pre_hook) = &target.pre_hook {
        let first = attached
            .first()
            .ok_or_else(|| StageError::NoAttachedContainer(target.name.clone()))?;
        let output = runtime
            .exec(&first.id, pre_hook)
            .await
            .map_err(|e| StageError::PreHook(e.to_string()))?;
        if !output.is_empty() {
            logger.debug(format!("pre-hook output: {output}")).await;
        }
    }
    if let Some(post_hook) = &target.post_hook {
        let first = attached
            .first()
            .ok_or_else(|| StageError::NoAttachedContainer(target.name.clone()))?;
        let container = first.id.clone();
        let command = post_hook.clone();
        let runtime = Arc::clone(runtime);
        let logger = logger.clone();
        cleanup.push("post-hook", move || async move {
            match runtime.exec(&container, &command).await {
                Ok(output) if !output.is_empty() => {
                    logger.debug(format!("post-hook output: {output}")).await;
                }
                Ok(_) => {}
                Err(e) => logger.warn(format!("post-hook failed: {e}")).await,
            }
        });
    }

    if target.stop_attached {
        let stopped: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        // registered before stopping so a mid-loop failure still restarts
        {
            let stopped = Arc::clone(&stopped);
            let runtime = Arc::clone(runtime);
            let logger = logger.clone();
            cleanup.push("restart stopped containers", move || async move {
                let ids: Vec<String> = stopped.lock().drain(..).collect();
                for id in ids {
                    if let Err(e) = runtime.start(&id).await {
                        logger
                            .warn(format!("failed to restart container {id}: {e}"))
                            .await;
                    }
                }
            });
        }
        for container in &attached {
            let writable = container
                .volume_mount(&target.name)
                .map(|m| !m.read_only)
                .unwrap_or(false);
            if container.running && writable {
                runtime.stop(&container.id).await?;
                stopped.lock().push(container.id.clone());
                logger
                    .debug(format!("stopped container {} for staging", container.name))
                    .await;
            }
        }
    }

    // volume-scoped subtree, removed on cleanup
    let sub = format!("{instance_id}/{token}/volume/{}", target.name);
    let local_dir = paths.local_root.join(&sub);
    {
        let local_dir = local_dir.clone();
        cleanup.push("remove staged subtree", move || async move {
            let _ = std::fs::remove_dir_all(&local_dir);
        });
    }

    if !runtime.image_present(SIDECAR_IMAGE).await? {
        runtime.pull_image(SIDECAR_IMAGE).await?;
    }
    let spec = ContainerSpec {
        name: format!("marina-stage-{}", uuid::Uuid::new_v4().simple()),
        image: SIDECAR_IMAGE.to_string(),
        cmd: SIDECAR_COMMAND.iter().map(|s| s.to_string()).collect(),
        env: Vec::new(),
        binds: vec![
            format!("{}:/source:ro", target.name),
            format!("{}:/backup", paths.host_root.display()),
        ],
        auto_remove: true,
    };
    let sidecar = runtime.create_container(spec).await?;
    {
        // AutoRemove usually wins; this covers the paths where it did not
        let sidecar = sidecar.clone();
        let runtime = Arc::clone(runtime);
        cleanup.push("remove sidecar", move || async move {
            let _ = runtime.stop(&sidecar).await;
            let _ = runtime.remove_container(&sidecar).await;
        });
    }
    runtime.start_container(&sidecar).await?;

    let mut staged = Vec::new();
    for path in &target.paths {
        let rel = path.trim_matches('/');
        let source = if rel.is_empty() {
            "/source/.".to_string()
        } else {
            format!("/source/{rel}/.")
        };
        let dest = if rel.is_empty() {
            format!("/backup/{sub}")
        } else {
            format!("/backup/{sub}/{rel}")
        };
        let command = format!(
            "mkdir -p \"$(dirname {dest_q})\" && mkdir -p {dest_q} && cp -a {src_q} {dest_q}",
            dest_q = shell_quote(&dest),
            src_q = shell_quote(&source),
        );
        runtime.exec(&sidecar, &command).await?;
        staged.push(if rel.is_empty() {
            local_dir.clone()
        } else {
            local_dir.join(rel)
        });
    }

    // stopping triggers AutoRemove
    let _ = runtime.stop(&sidecar).await;

    if !staged.iter().any(|p| has_nonempty_file(p)) {
        return Err(StageError::EmptyStage);
    }

    Ok(staged)
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
