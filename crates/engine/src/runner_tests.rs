// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use marina_backend::FakeBackend;
use marina_core::{DatabaseTarget, DbKind, Retention, VolumeTarget};
use marina_runtime::{FakeRuntime, RuntimeCall};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: Store,
    runtime: FakeRuntime,
    backend: FakeBackend,
    runner: Runner,
    stage_root: std::path::PathBuf,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("marina.db")).await.unwrap();
    let logger = JobLogger::new(store.clone());
    let runtime = FakeRuntime::new();
    runtime.add_volume("app-data");

    let stage_root = dir.path().join("stage");
    let backend = FakeBackend::new();
    let mut backends = HashMap::new();
    backends.insert(InstanceId::new("local"), Backend::Fake(backend.clone()));

    let runner = Runner::new(
        store.clone(),
        logger,
        Arc::new(runtime.clone()),
        backends,
        StagePaths::new("/mnt/host/backups", stage_root.clone()),
    );
    Fixture {
        _dir: dir,
        store,
        runtime,
        backend,
        runner,
        stage_root,
    }
}

fn volume_schedule() -> InstanceBackupSchedule {
    InstanceBackupSchedule {
        instance_id: InstanceId::new("local"),
        cron: "* * * * *".to_string(),
        targets: vec![BackupTarget::Volume(VolumeTarget {
            name: "app-data".to_string(),
            paths: vec!["/".to_string()],
            stop_attached: false,
            pre_hook: None,
            post_hook: None,
        })],
        retention: Retention::new(7, 4, 6),
    }
}

fn db_target(name: &str) -> BackupTarget {
    BackupTarget::Database(DatabaseTarget {
        name: name.to_string(),
        container_id: "unknown".to_string(),
        kind: DbKind::Postgres,
        dump_args: Vec::new(),
        pre_hook: None,
        post_hook: None,
    })
}

/// Materialize a staged file whenever the sidecar copy command runs, so
/// volume staging validates.
fn materialize_on_copy(fixture: &Fixture) {
    let stage_root = fixture.stage_root.clone();
    fixture.runtime.set_exec_handler(move |_, command| {
        if command.contains("cp -a") {
            let dest = command
                .split("cp -a")
                .nth(1)?
                .split('\'')
                .filter(|s| s.starts_with("/backup/"))
                .next_back()?
                .to_string();
            let local = stage_root.join(dest.trim_start_matches("/backup/"));
            std::fs::create_dir_all(&local).ok()?;
            std::fs::write(local.join("data.bin"), b"bytes").ok()?;
            Some(Ok(String::new()))
        } else {
            None
        }
    });
}

fn stage_entries(fixture: &Fixture) -> usize {
    match std::fs::read_dir(fixture.stage_root.join("local")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn successful_job_records_success_and_invokes_backend_once() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    fixture.runner.run_once(&InstanceId::new("local")).await;

    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].status, JobState::Success);
    assert_eq!(statuses[0].iid, 1);
    assert_eq!(statuses[0].last_targets_successful, 1);
    assert_eq!(statuses[0].last_targets_total, 1);
    assert!(statuses[0].last_started_at.is_some());
    assert!(statuses[0].last_completed_at.is_some());

    let calls = fixture.backend.backup_calls();
    assert_eq!(calls.len(), 1, "backend invoked exactly once");
    assert_eq!(calls[0].tags, vec!["volume:app-data"]);
    assert_eq!(calls[0].paths.len(), 1);
    assert!(calls[0].paths[0]
        .to_string_lossy()
        .contains("/volume/app-data"));

    assert_eq!(
        fixture.backend.retention_calls(),
        vec![Retention::new(7, 4, 6)]
    );

    // cleanup removed the job's stage tree
    assert_eq!(stage_entries(&fixture), 0);
}

#[tokio::test]
async fn partial_success_when_one_target_fails() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    let mut schedule = volume_schedule();
    schedule.targets.push(db_target("pg"));
    fixture.runner.sync(vec![schedule]).await.unwrap();

    fixture.runner.run_once(&InstanceId::new("local")).await;

    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses[0].status, JobState::PartialSuccess);
    assert_eq!(statuses[0].last_targets_successful, 1);
    assert_eq!(statuses[0].last_targets_total, 2);

    // one backend invocation, with the failed target's tag absent
    let calls = fixture.backend.backup_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tags, vec!["volume:app-data"]);

    // the failure is visible in the job's log
    let logs = fixture.store.job_logs(statuses[0].id, 100).await.unwrap();
    assert!(logs.iter().any(|l| {
        l.level == marina_core::LogLevel::Warn
            && l.message.contains("db:pg")
            && l.target_id.as_ref().map(|t| t.as_str()) == Some("db:pg:unknown")
    }));
}

#[tokio::test]
async fn failed_when_no_target_stages_and_backend_is_skipped() {
    let fixture = fixture().await;
    let mut schedule = volume_schedule();
    schedule.targets = vec![db_target("pg")];
    fixture.runner.sync(vec![schedule]).await.unwrap();

    fixture.runner.run_once(&InstanceId::new("local")).await;

    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses[0].status, JobState::Failed);
    assert_eq!(statuses[0].last_targets_successful, 0);
    assert!(
        fixture.backend.backup_calls().is_empty(),
        "backend must not run without staged targets"
    );
    assert!(fixture.backend.retention_calls().is_empty());
}

#[tokio::test]
async fn backup_failure_is_terminal_failed() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    fixture.backend.fail_backups();
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    fixture.runner.run_once(&InstanceId::new("local")).await;

    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses[0].status, JobState::Failed);
    assert_eq!(statuses[0].last_targets_successful, 1);
    assert!(fixture.backend.retention_calls().is_empty());
    // cleanup still ran
    assert_eq!(stage_entries(&fixture), 0);
}

#[tokio::test]
async fn retention_failure_is_tolerated() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    fixture.backend.fail_retention();
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    fixture.runner.run_once(&InstanceId::new("local")).await;

    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses[0].status, JobState::Success);
    let logs = fixture.store.job_logs(statuses[0].id, 100).await.unwrap();
    assert!(logs
        .iter()
        .any(|l| l.level == marina_core::LogLevel::Warn && l.message.contains("retention")));
}

#[tokio::test]
async fn stopped_containers_restart_even_when_backup_fails() {
    let fixture = fixture().await;
    fixture.runtime.add_container(marina_runtime::ContainerInfo {
        id: "writer".to_string(),
        name: "writer".to_string(),
        image: "app:1".to_string(),
        running: true,
        mounts: vec![marina_runtime::MountInfo {
            volume_name: Some("app-data".to_string()),
            source: String::new(),
            destination: "/data".to_string(),
            read_only: false,
        }],
    });
    materialize_on_copy(&fixture);
    fixture.backend.fail_backups();

    let mut schedule = volume_schedule();
    if let BackupTarget::Volume(v) = &mut schedule.targets[0] {
        v.stop_attached = true;
    }
    fixture.runner.sync(vec![schedule]).await.unwrap();
    fixture.runner.run_once(&InstanceId::new("local")).await;

    assert!(fixture
        .runtime
        .calls()
        .contains(&RuntimeCall::Stop("writer".to_string())));
    assert_eq!(fixture.runtime.container_running("writer"), Some(true));
}

#[tokio::test]
async fn concurrent_runs_get_unique_monotonic_iids() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    let id = InstanceId::new("local");
    tokio::join!(
        fixture.runner.run_once(&id),
        fixture.runner.run_once(&id)
    );

    let statuses = fixture.store.job_statuses(&id).await.unwrap();
    let mut iids: Vec<i64> = statuses.iter().map(|s| s.iid).collect();
    iids.sort_unstable();
    assert_eq!(iids, vec![1, 2]);
    assert!(statuses.iter().all(|s| s.status.is_terminal()));
}

#[tokio::test]
async fn sync_registers_and_removes_instances() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();
    assert_eq!(fixture.runner.active_instances(), vec![InstanceId::new("local")]);
    assert_eq!(fixture.store.schedules().await.unwrap().len(), 1);

    fixture.runner.run_once(&InstanceId::new("local")).await;

    fixture.runner.sync(Vec::new()).await.unwrap();
    assert!(fixture.runner.active_instances().is_empty());
    assert!(fixture.store.schedules().await.unwrap().is_empty());

    // removal deactivates the instance's job rows but keeps them
    let statuses = fixture
        .store
        .job_statuses(&InstanceId::new("local"))
        .await
        .unwrap();
    assert_eq!(statuses.len(), 1);
    assert!(!statuses[0].is_active);
}

#[tokio::test]
async fn sync_twice_with_same_set_is_a_no_op() {
    let fixture = fixture().await;
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();
    let before = fixture.store.schedules().await.unwrap();

    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();
    let after = fixture.store.schedules().await.unwrap();

    assert_eq!(before, after, "no store mutation on equivalent sync");
}

#[tokio::test]
async fn sync_reregisters_on_cron_change() {
    let fixture = fixture().await;
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    let mut changed = volume_schedule();
    changed.cron = "0 3 * * *".to_string();
    fixture.runner.sync(vec![changed]).await.unwrap();

    let schedules = fixture.store.schedules().await.unwrap();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].cron, "0 3 * * *");
    assert!(schedules[0].next_run_at.is_some());
}

#[tokio::test]
async fn schedule_view_mirrors_targets_and_retention() {
    let fixture = fixture().await;
    fixture.runner.sync(vec![volume_schedule()]).await.unwrap();

    let schedules = fixture.store.schedules().await.unwrap();
    assert_eq!(schedules[0].instance_id, "local");
    assert_eq!(schedules[0].retention, Retention::new(7, 4, 6));
    assert_eq!(
        schedules[0]
            .target_ids
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>(),
        vec!["volume:app-data"]
    );
}
