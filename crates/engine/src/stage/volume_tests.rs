// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use marina_runtime::{ContainerInfo, FakeRuntime, MountInfo, RuntimeCall};
use marina_store::Store;
use tempfile::TempDir;

const TOKEN: &str = "20260101-030000";

struct Fixture {
    _dir: TempDir,
    runtime: FakeRuntime,
    logger: JobLogger,
    store: Store,
    paths: StagePaths,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("marina.db")).await.unwrap();
    let logger = JobLogger::new(store.clone());
    let runtime = FakeRuntime::new();
    runtime.add_volume("app-data");
    let paths = StagePaths::new("/mnt/host/backups", dir.path().join("stage"));
    Fixture {
        _dir: dir,
        runtime,
        logger,
        store,
        paths,
    }
}

fn volume_target() -> VolumeTarget {
    VolumeTarget {
        name: "app-data".to_string(),
        paths: vec!["/".to_string()],
        stop_attached: false,
        pre_hook: None,
        post_hook: None,
    }
}

fn attached_container(id: &str, running: bool, read_only: bool) -> ContainerInfo {
    ContainerInfo {
        id: id.to_string(),
        name: format!("{id}-name"),
        image: "app:latest".to_string(),
        running,
        mounts: vec![MountInfo {
            volume_name: Some("app-data".to_string()),
            source: String::new(),
            destination: "/data".to_string(),
            read_only,
        }],
    }
}

/// Installs an exec handler that materializes a file whenever the
/// sidecar copy command runs.
fn materialize_on_copy(fixture: &Fixture) {
    let stage_dir = fixture
        .paths
        .local_root
        .join(format!("local/{TOKEN}/volume/app-data"));
    fixture.runtime.set_exec_handler(move |_, command| {
        if command.contains("cp -a") {
            std::fs::create_dir_all(&stage_dir).ok()?;
            std::fs::write(stage_dir.join("data.bin"), b"bytes").ok()?;
            Some(Ok(String::new()))
        } else {
            None
        }
    });
}

async fn stage(fixture: &Fixture, target: &VolumeTarget) -> Result<(Vec<PathBuf>, crate::CleanupStack), StageError> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(fixture.runtime.clone());
    stage_volume(
        &runtime,
        &fixture.logger,
        &"local".into(),
        TOKEN,
        &fixture.paths,
        target,
    )
    .await
}

#[tokio::test]
async fn stages_root_path_through_sidecar() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);

    let (staged, mut cleanup) = stage(&fixture, &volume_target()).await.unwrap();

    let expected = fixture
        .paths
        .local_root
        .join(format!("local/{TOKEN}/volume/app-data"));
    assert_eq!(staged, vec![expected.clone()]);

    let calls = fixture.runtime.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        RuntimeCall::CreateContainer { image, name } if image == "alpine:3.20" && name.starts_with("marina-stage-")
    )));
    let copy = calls
        .iter()
        .find_map(|c| match c {
            RuntimeCall::Exec { command, .. } if command.contains("cp -a") => Some(command.clone()),
            _ => None,
        })
        .unwrap();
    assert!(copy.contains("'/source/.'"), "got: {copy}");
    assert!(
        copy.contains(&format!("'/backup/local/{TOKEN}/volume/app-data'")),
        "got: {copy}"
    );

    // sidecar stopped after the copies (stop triggers auto-remove)
    assert!(calls.iter().any(|c| matches!(c, RuntimeCall::Stop(_))));

    cleanup.drain().await;
    assert!(!expected.exists(), "cleanup removes the staged subtree");
}

#[tokio::test]
async fn stages_multiple_sub_paths() {
    let fixture = fixture().await;
    let uploads = fixture
        .paths
        .local_root
        .join(format!("local/{TOKEN}/volume/app-data/uploads"));
    {
        let uploads = uploads.clone();
        fixture.runtime.set_exec_handler(move |_, command| {
            if command.contains("cp -a") && command.contains("uploads") {
                std::fs::create_dir_all(&uploads).ok()?;
                std::fs::write(uploads.join("f"), b"x").ok()?;
            }
            Some(Ok(String::new()))
        });
    }

    let mut target = volume_target();
    target.paths = vec!["/uploads".to_string(), "/conf".to_string()];
    let (staged, mut cleanup) = stage(&fixture, &target).await.unwrap();

    assert_eq!(staged.len(), 2);
    assert!(staged[0].ends_with("app-data/uploads"));
    assert!(staged[1].ends_with("app-data/conf"));

    cleanup.drain().await;
}

#[tokio::test]
async fn missing_volume_fails_before_any_container_work() {
    let fixture = fixture().await;
    let mut target = volume_target();
    target.name = "ghost".to_string();

    let err = stage(&fixture, &target).await.unwrap_err();
    assert!(matches!(err, StageError::VolumeNotFound(name) if name == "ghost"));
    assert!(fixture.runtime.calls().is_empty());
}

#[tokio::test]
async fn stop_attached_stops_writable_and_restarts_on_cleanup() {
    let fixture = fixture().await;
    fixture.runtime.add_container(attached_container("writer", true, false));
    fixture.runtime.add_container(attached_container("reader", true, true));
    fixture
        .runtime
        .add_container(attached_container("parked", false, false));
    materialize_on_copy(&fixture);

    let mut target = volume_target();
    target.stop_attached = true;
    let (_staged, mut cleanup) = stage(&fixture, &target).await.unwrap();

    let calls = fixture.runtime.calls();
    assert!(calls.contains(&RuntimeCall::Stop("writer".to_string())));
    assert!(
        !calls.contains(&RuntimeCall::Stop("reader".to_string())),
        "read-only mounts are not stopped"
    );
    assert!(
        !calls.contains(&RuntimeCall::Stop("parked".to_string())),
        "stopped containers stay stopped"
    );
    assert_eq!(fixture.runtime.container_running("writer"), Some(false));

    cleanup.drain().await;
    assert_eq!(fixture.runtime.container_running("writer"), Some(true));
    assert_eq!(fixture.runtime.container_running("parked"), Some(false));
}

#[tokio::test]
async fn failed_staging_restarts_stopped_containers_immediately() {
    let fixture = fixture().await;
    fixture.runtime.add_container(attached_container("writer", true, false));
    // no exec handler: nothing staged, validation fails

    let mut target = volume_target();
    target.stop_attached = true;
    let err = stage(&fixture, &target).await.unwrap_err();
    assert!(matches!(err, StageError::EmptyStage));

    // the error path drained the partial cleanup chain
    assert_eq!(fixture.runtime.container_running("writer"), Some(true));
    let stage_root = fixture.paths.local_root.join("local");
    assert!(!stage_root.exists());
}

#[tokio::test]
async fn pre_hook_runs_in_first_attached_container() {
    let fixture = fixture().await;
    fixture.runtime.add_container(attached_container("app", true, false));
    materialize_on_copy(&fixture);

    let mut target = volume_target();
    target.pre_hook = Some("sync && sleep 1".to_string());
    let (_staged, mut cleanup) = stage(&fixture, &target).await.unwrap();

    let calls = fixture.runtime.calls();
    assert!(calls.contains(&RuntimeCall::Exec {
        container: "app".to_string(),
        command: "sync && sleep 1".to_string(),
    }));
    cleanup.drain().await;
}

#[tokio::test]
async fn pre_hook_without_attached_container_fails() {
    let fixture = fixture().await;
    let mut target = volume_target();
    target.pre_hook = Some("sync".to_string());

    let err = stage(&fixture, &target).await.unwrap_err();
    assert!(matches!(err, StageError::NoAttachedContainer(_)));
}

#[tokio::test]
async fn failing_pre_hook_aborts_staging() {
    let fixture = fixture().await;
    fixture.runtime.add_container(attached_container("app", true, false));
    fixture.runtime.script_exec("sync", Err((1, "not permitted")));

    let mut target = volume_target();
    target.pre_hook = Some("sync".to_string());
    let err = stage(&fixture, &target).await.unwrap_err();
    assert!(matches!(err, StageError::PreHook(msg) if msg.contains("not permitted")));

    // no sidecar was created for the aborted target
    assert!(!fixture
        .runtime
        .calls()
        .iter()
        .any(|c| matches!(c, RuntimeCall::CreateContainer { .. })));
}

#[tokio::test]
async fn post_hook_runs_on_cleanup() {
    let fixture = fixture().await;
    fixture.runtime.add_container(attached_container("app", true, false));
    materialize_on_copy(&fixture);

    let mut target = volume_target();
    target.post_hook = Some("echo done".to_string());
    let (_staged, mut cleanup) = stage(&fixture, &target).await.unwrap();

    let before: Vec<RuntimeCall> = fixture.runtime.calls();
    assert!(!before.contains(&RuntimeCall::Exec {
        container: "app".to_string(),
        command: "echo done".to_string(),
    }));

    cleanup.drain().await;
    assert!(fixture.runtime.calls().contains(&RuntimeCall::Exec {
        container: "app".to_string(),
        command: "echo done".to_string(),
    }));
}

#[tokio::test]
async fn logger_receives_no_records_for_quiet_staging() {
    let fixture = fixture().await;
    materialize_on_copy(&fixture);
    let (_staged, mut cleanup) = stage(&fixture, &volume_target()).await.unwrap();
    cleanup.drain().await;

    let logs = fixture
        .store
        .system_logs(marina_core::LogLevel::Debug, 100)
        .await
        .unwrap();
    assert!(logs.is_empty());
}
