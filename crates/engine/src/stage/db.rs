// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database staging
//!
//! Dumps a database container into a container-side scratch directory,
//! copies the dump out as a tar stream, and lands it in the staging
//! tree.

use super::{extract_single_file, shell_quote, StageError, StagePaths};
use crate::CleanupStack;
use futures::StreamExt;
use marina_core::{DatabaseTarget, DbKind, InstanceId};
use marina_runtime::{ContainerRuntime, RuntimeError};
use marina_store::JobLogger;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) async fn stage_database(
    runtime: &Arc<dyn ContainerRuntime>,
    logger: &JobLogger,
    instance_id: &InstanceId,
    token: &str,
    paths: &StagePaths,
    target: &DatabaseTarget,
) -> Result<(Vec<PathBuf>, CleanupStack), StageError> {
    let mut cleanup = CleanupStack::new();
    match run(runtime, logger, instance_id, token, paths, target, &mut cleanup).await {
        Ok(staged) => Ok((vec![staged], cleanup)),
        Err(e) => {
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
    target: &DatabaseTarget,
    cleanup: &mut CleanupStack,
) -> Result<PathBuf, StageError> {
    // resolve by name at stage time; the container may have been
    // recreated since the schedule was built
    let container = runtime
        .inspect_container(&target.name)
        .await
        .map_err(|_| StageError::ContainerNotFound(target.name.clone()))?;

    if let Some(pre_hook) = &target.pre_hook {
        let output = runtime
            .exec(&container.id, pre_hook)
            .await
            .map_err(|e| StageError::PreHook(e.to_string()))?;
        if !output.is_empty() {
            logger.debug(format!("pre-hook output: {output}")).await;
        }
    }
    if let Some(post_hook) = &target.post_hook {
        let id = container.id.clone();
        let command = post_hook.clone();
        let runtime = Arc::clone(runtime);
        let logger = logger.clone();
        cleanup.push("post-hook", move || async move {
            match runtime.exec(&id, &command).await {
                Ok(output) if !output.is_empty() => {
                    logger.debug(format!("post-hook output: {output}")).await;
                }
                Ok(_) => {}
                Err(e) => logger.warn(format!("post-hook failed: {e}")).await,
            }
        });
    }

    // container-side scratch directory for the dump
    let dump_dir = format!("/tmp/marina-{token}");
    runtime
        .exec(&container.id, &format!("mkdir -p {}", shell_quote(&dump_dir)))
        .await?;
    {
        let id = container.id.clone();
        let dir = dump_dir.clone();
        let runtime = Arc::clone(runtime);
        cleanup.push("remove container dump dir", move || async move {
            let _ = runtime.exec(&id, &format!("rm -rf {}", shell_quote(&dir))).await;
        });
    }

    let local_dir = paths
        .local_root
        .join(format!("{instance_id}/{token}/db/{}", target.name));
    std::fs::create_dir_all(&local_dir)?;
    {
        let dir = local_dir.clone();
        cleanup.push("remove staged subtree", move || async move {
            let _ = std::fs::remove_dir_all(&dir);
        });
    }

    let file_name = dump_file_name(target.kind);
    let dump_path = format!("{dump_dir}/{file_name}");
    run_dump(runtime, &container.id, target, &dump_path).await?;

    // single-file tar stream out of the container
    let mut stream = runtime.copy_from_container(&container.id, &dump_path);
    let mut archive = Vec::new();
    while let Some(chunk) = stream.next().await {
        archive.extend_from_slice(&chunk?);
    }
    let local_file = local_dir.join(file_name);
    let (written, header_size) = extract_single_file(&archive, &local_file)?;
    if written != header_size {
        logger
            .warn(format!(
                "dump size mismatch: wrote {written} bytes, archive declared {header_size}"
            ))
            .await;
    }

    let non_empty = local_file.metadata().map(|m| m.len() > 0).unwrap_or(false);
    if !non_empty {
        return Err(StageError::EmptyStage);
    }

    Ok(local_file)
}

fn dump_file_name(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Postgres | DbKind::Mysql | DbKind::Mariadb => "dump.sql",
        DbKind::Mongo => "dump.archive",
    }
}

async fn run_dump(
    runtime: &Arc<dyn ContainerRuntime>,
    container: &str,
    target: &DatabaseTarget,
    dump_path: &str,
) -> Result<(), StageError> {
    let args = target.dump_args.join(" ");
    let out = shell_quote(dump_path);
    match target.kind {
        DbKind::Postgres => {
            let command = if args.is_empty() {
                format!("pg_dumpall -U postgres > {out}")
            } else {
                format!("pg_dumpall -U postgres {args} > {out}")
            };
            exec_dump(runtime, container, &command).await
        }
        DbKind::Mysql | DbKind::Mariadb => {
            let (tool, env_prefix) = match target.kind {
                DbKind::Mariadb => ("mariadb-dump", "MARIADB"),
                _ => ("mysqldump", "MYSQL"),
            };
            if !args.is_empty() {
                return exec_dump(runtime, container, &format!("{tool} {args} > {out}")).await;
            }
            // root credentials first, image-default user second
            let root = format!(
                "{tool} --single-transaction --all-databases -uroot -p\"${env_prefix}_ROOT_PASSWORD\" > {out}"
            );
            if exec_dump(runtime, container, &root).await.is_ok() {
                return Ok(());
            }
            let user = format!(
                "{tool} --single-transaction --all-databases -u\"${env_prefix}_USER\" -p\"${env_prefix}_PASSWORD\" > {out}"
            );
            exec_dump(runtime, container, &user).await
        }
        DbKind::Mongo => {
            let command = if args.is_empty() {
                format!("mongodump --archive > {out}")
            } else {
                format!("mongodump --archive {args} > {out}")
            };
            exec_dump(runtime, container, &command).await
        }
    }
}

async fn exec_dump(
    runtime: &Arc<dyn ContainerRuntime>,
    container: &str,
    command: &str,
) -> Result<(), StageError> {
    match runtime.exec(container, command).await {
        Ok(_) => Ok(()),
        Err(RuntimeError::ExecFailed { exit_code, output }) => Err(StageError::Dump(format!(
            "exit {exit_code}: {output}"
        ))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
