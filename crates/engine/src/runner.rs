// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job runner
//!
//! Owns the in-memory schedule map and the per-instance cron loops.
//! Each tick spawns an independent job task: insert the status row,
//! stage every target, invoke the backend once, apply retention, and
//! drain the cleanup chain on every exit path. Overlapping ticks for
//! one instance are allowed; their resources are disjoint because the
//! timestamp token differs.

use crate::cron_expr::{next_run, parse_cron};
use crate::stage::{stage_database, stage_volume, StagePaths};
use crate::CleanupStack;
use chrono::Utc;
use marina_backend::Backend;
use marina_core::{
    BackupScheduleView, BackupTarget, InstanceBackupSchedule, InstanceId, JobState,
};
use marina_runtime::ContainerRuntime;
use marina_store::{JobLogger, Store, StoreError};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Hard deadline for one job execution.
const JOB_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);
/// Grace period before cron loops are torn down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Entry {
    schedule: InstanceBackupSchedule,
    cron: cron::Schedule,
    handle: JoinHandle<()>,
}

struct RunnerInner {
    store: Store,
    logger: JobLogger,
    runtime: Arc<dyn ContainerRuntime>,
    backends: HashMap<InstanceId, Backend>,
    paths: StagePaths,
    entries: Mutex<HashMap<InstanceId, Entry>>,
}

/// Cron registry and job executor. Cheap to clone.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

impl Runner {
    pub fn new(
        store: Store,
        logger: JobLogger,
        runtime: Arc<dyn ContainerRuntime>,
        backends: HashMap<InstanceId, Backend>,
        paths: StagePaths,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                store,
                logger,
                runtime,
                backends,
                paths,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Reconcile the active schedule set against `new_schedules`:
    /// removed instances are cancelled and their job rows deactivated,
    /// new ones registered, changed ones re-registered, and the
    /// `backup_schedules` table rewritten to exactly the new set.
    pub async fn sync(
        &self,
        new_schedules: Vec<InstanceBackupSchedule>,
    ) -> Result<(), StoreError> {
        let new_ids: HashSet<InstanceId> = new_schedules
            .iter()
            .map(|s| s.instance_id.clone())
            .collect();

        let removed: Vec<InstanceId> = {
            let mut entries = self.inner.entries.lock();
            let removed: Vec<InstanceId> = entries
                .keys()
                .filter(|id| !new_ids.contains(*id))
                .cloned()
                .collect();
            for id in &removed {
                if let Some(entry) = entries.remove(id) {
                    entry.handle.abort();
                }
            }
            removed
        };
        for id in &removed {
            self.inner
                .logger
                .info(format!("instance {id} removed from schedule"))
                .await;
            if let Err(e) = self.inner.store.deactivate_instance_jobs(id).await {
                self.inner
                    .logger
                    .warn(format!("failed to deactivate jobs for {id}: {e}"))
                    .await;
            }
        }

        let mut changed = !removed.is_empty();
        for schedule in new_schedules {
            changed |= self.register(schedule).await;
        }

        // an equivalent set leaves the mirror untouched
        if changed {
            let views = self.views();
            self.inner.store.replace_schedules(&views).await?;
        }
        Ok(())
    }

    /// Returns true when the registration changed the active set.
    async fn register(&self, schedule: InstanceBackupSchedule) -> bool {
        let cron = match parse_cron(&schedule.cron) {
            Ok(cron) => cron,
            Err(e) => {
                self.inner
                    .logger
                    .warn(format!(
                        "instance {}: rejecting schedule with invalid cron: {e}",
                        schedule.instance_id
                    ))
                    .await;
                return false;
            }
        };

        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get(&schedule.instance_id) {
            if existing.schedule.is_equivalent(&schedule) {
                return false;
            }
        }
        if let Some(old) = entries.remove(&schedule.instance_id) {
            old.handle.abort();
        }
        let handle = spawn_cron_loop(&self.inner, schedule.clone(), cron.clone());
        entries.insert(
            schedule.instance_id.clone(),
            Entry {
                schedule,
                cron,
                handle,
            },
        );
        true
    }

    /// The instances currently registered.
    pub fn active_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.inner.entries.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    fn views(&self) -> Vec<BackupScheduleView> {
        let now = Utc::now();
        let entries = self.inner.entries.lock();
        entries
            .values()
            .map(|entry| BackupScheduleView {
                instance_id: entry.schedule.instance_id.clone(),
                cron: entry.schedule.cron.clone(),
                next_run_at: next_run(&entry.cron),
                retention: entry.schedule.retention,
                target_ids: entry.schedule.target_ids(),
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    /// Run one instance's job immediately, outside its cron cadence.
    #[cfg(test)]
    pub(crate) async fn run_once(&self, instance_id: &InstanceId) {
        let schedule = {
            let entries = self.inner.entries.lock();
            entries.get(instance_id).map(|e| e.schedule.clone())
        };
        if let Some(schedule) = schedule {
            run_job(Arc::clone(&self.inner), schedule).await;
        }
    }

    /// Stop scheduling new jobs. In-flight jobs keep running up to
    /// their deadline.
    pub async fn shutdown(&self) {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        let mut entries = self.inner.entries.lock();
        for (_, entry) in entries.drain() {
            entry.handle.abort();
        }
    }
}

fn spawn_cron_loop(
    inner: &Arc<RunnerInner>,
    schedule: InstanceBackupSchedule,
    cron: cron::Schedule,
) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        loop {
            let Some(next) = next_run(&cron) else {
                break;
            };
            let Ok(wait) = (next - Utc::now()).to_std() else {
                continue;
            };
            tokio::time::sleep(wait).await;

            // each tick gets its own task; ticks may overlap
            let inner = Arc::clone(&inner);
            let schedule = schedule.clone();
            tokio::spawn(async move {
                run_job(inner, schedule).await;
            });
        }
    })
}

async fn run_job(inner: Arc<RunnerInner>, schedule: InstanceBackupSchedule) {
    let instance_id = &schedule.instance_id;
    let base = inner.logger.with_instance(instance_id);

    let (job_id, iid) = match inner
        .store
        .insert_job(instance_id, schedule.targets.len() as i64)
        .await
    {
        Ok(ids) => ids,
        Err(e) => {
            base.error(format!("failed to create job record: {e}")).await;
            return;
        }
    };
    let logger = base.with_job(job_id, iid);

    if let Err(e) = inner.store.mark_job_started(job_id).await {
        logger.warn(format!("failed to record job start: {e}")).await;
    }
    // roots every staging path of this job
    let token = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    logger
        .info(format!(
            "job {iid} started, staging {} targets",
            schedule.targets.len()
        ))
        .await;

    let mut cleanup = CleanupStack::new();
    {
        // job-scoped stage root; runs after the per-target cleanups
        let job_root = inner
            .paths
            .local_root
            .join(instance_id.as_str())
            .join(&token);
        cleanup.push("remove job stage root", move || async move {
            let _ = std::fs::remove_dir_all(&job_root);
        });
    }
    let outcome = tokio::time::timeout(
        JOB_TIMEOUT,
        execute(&inner, &schedule, &logger, &token, &mut cleanup),
    )
    .await;
    let (state, successful) = match outcome {
        Ok(result) => result,
        Err(_) => {
            logger.error("job deadline exceeded").await;
            (JobState::Failed, 0)
        }
    };

    if let Err(e) = inner.store.finish_job(job_id, state, successful).await {
        logger.warn(format!("failed to record job completion: {e}")).await;
    }
    logger
        .info(format!(
            "job {iid} finished: {state} ({successful}/{} targets)",
            schedule.targets.len()
        ))
        .await;

    cleanup.drain().await;

    let next = {
        let entries = inner.entries.lock();
        entries.get(instance_id).and_then(|e| next_run(&e.cron))
    };
    if let Err(e) = inner.store.update_next_run(instance_id, next).await {
        logger.warn(format!("failed to update next run time: {e}")).await;
    }
}

/// Stage all targets, then invoke the backend at most once.
async fn execute(
    inner: &Arc<RunnerInner>,
    schedule: &InstanceBackupSchedule,
    logger: &JobLogger,
    token: &str,
    cleanup: &mut CleanupStack,
) -> (JobState, i64) {
    let mut staged_paths = Vec::new();
    let mut tags = BTreeSet::new();
    let mut successful = 0i64;
    let mut failed = 0i64;

    for target in &schedule.targets {
        let target_logger = logger.with_target(&target.id());
        target_logger.debug(format!("staging {}", target.id())).await;
        let result = match target {
            BackupTarget::Volume(volume) => {
                stage_volume(
                    &inner.runtime,
                    &target_logger,
                    &schedule.instance_id,
                    token,
                    &inner.paths,
                    volume,
                )
                .await
            }
            BackupTarget::Database(db) => {
                stage_database(
                    &inner.runtime,
                    &target_logger,
                    &schedule.instance_id,
                    token,
                    &inner.paths,
                    db,
                )
                .await
            }
        };
        match result {
            Ok((paths, stack)) => {
                cleanup.absorb(stack);
                staged_paths.extend(paths);
                tags.insert(target.tag());
                successful += 1;
            }
            Err(e) => {
                failed += 1;
                target_logger
                    .warn(format!("staging {} failed: {e}", target.id()))
                    .await;
            }
        }
    }

    if successful == 0 {
        logger
            .error("no target staged successfully, skipping backend")
            .await;
        return (JobState::Failed, 0);
    }

    let Some(backend) = inner.backends.get(&schedule.instance_id) else {
        logger.error("no backend configured for instance").await;
        return (JobState::Failed, successful);
    };
    let mut backend = backend.clone();
    if backend.wants_logger() {
        backend.set_logger(logger.clone());
    }

    let tags: Vec<String> = tags.into_iter().collect();
    match backend.backup(&staged_paths, &tags).await {
        Ok(output) => {
            if !output.is_empty() {
                logger.debug(output).await;
            }
        }
        Err(e) => {
            logger.error(format!("backup failed: {e}")).await;
            return (JobState::Failed, successful);
        }
    }

    if let Err(e) = backend.apply_retention(schedule.retention).await {
        logger.warn(format!("retention failed: {e}")).await;
    }

    if failed == 0 {
        (JobState::Success, successful)
    } else {
        (JobState::PartialSuccess, successful)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
