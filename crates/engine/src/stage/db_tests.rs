// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use marina_runtime::{ContainerInfo, FakeRuntime, RuntimeCall};
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
    runtime.add_container(ContainerInfo {
        id: "pg-cid".to_string(),
        name: "pg".to_string(),
        image: "postgres:16-alpine".to_string(),
        running: true,
        mounts: Vec::new(),
    });
    let paths = StagePaths::new("/mnt/host/backups", dir.path().join("stage"));
    Fixture {
        _dir: dir,
        runtime,
        logger,
        store,
        paths,
    }
}

fn tar_with_file(name: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data).unwrap();
    builder.into_inner().unwrap()
}

fn postgres_target() -> DatabaseTarget {
    DatabaseTarget {
        name: "pg".to_string(),
        container_id: "pg-cid".to_string(),
        kind: DbKind::Postgres,
        dump_args: Vec::new(),
        pre_hook: None,
        post_hook: None,
    }
}

async fn stage(
    fixture: &Fixture,
    target: &DatabaseTarget,
) -> Result<(Vec<PathBuf>, crate::CleanupStack), StageError> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(fixture.runtime.clone());
    stage_database(
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
async fn postgres_dump_lands_in_stage_tree() {
    let fixture = fixture().await;
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b"-- dump\nSELECT 1;\n"));

    let (staged, mut cleanup) = stage(&fixture, &postgres_target()).await.unwrap();

    assert_eq!(staged.len(), 1);
    let expected = fixture
        .paths
        .local_root
        .join(format!("local/{TOKEN}/db/pg/dump.sql"));
    assert_eq!(staged[0], expected);
    assert_eq!(
        std::fs::read_to_string(&expected).unwrap(),
        "-- dump\nSELECT 1;\n"
    );

    let calls = fixture.runtime.calls();
    let dump = calls
        .iter()
        .find_map(|c| match c {
            RuntimeCall::Exec { command, .. } if command.contains("pg_dumpall") => {
                Some(command.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(
        dump.contains(&format!("pg_dumpall -U postgres > '/tmp/marina-{TOKEN}/dump.sql'")),
        "got: {dump}"
    );
    assert!(calls.contains(&RuntimeCall::CopyFrom {
        container: "pg-cid".to_string(),
        path: format!("/tmp/marina-{TOKEN}/dump.sql"),
    }));

    cleanup.drain().await;
    assert!(!expected.exists(), "cleanup removes the staged dump");
    assert!(
        fixture.runtime.calls().iter().any(|c| matches!(
            c,
            RuntimeCall::Exec { command, .. } if command.contains("rm -rf") && command.contains(TOKEN)
        )),
        "cleanup removes the container-side dump dir"
    );
}

#[tokio::test]
async fn dump_args_are_passed_through() {
    let fixture = fixture().await;
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b"x"));
    let mut target = postgres_target();
    target.dump_args = vec!["--no-owner".to_string()];

    let (_, mut cleanup) = stage(&fixture, &target).await.unwrap();
    cleanup.drain().await;

    assert!(fixture.runtime.calls().iter().any(|c| matches!(
        c,
        RuntimeCall::Exec { command, .. } if command.contains("pg_dumpall -U postgres --no-owner >")
    )));
}

#[tokio::test]
async fn mysql_falls_back_to_user_credentials() {
    let fixture = fixture().await;
    fixture.runtime.add_container(ContainerInfo {
        id: "mysql-cid".to_string(),
        name: "mysql-main".to_string(),
        image: "mysql:8".to_string(),
        running: true,
        mounts: Vec::new(),
    });
    fixture.runtime.script_exec("-uroot", Err((1, "access denied")));
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b"dump"));

    let target = DatabaseTarget {
        name: "mysql-main".to_string(),
        container_id: "mysql-cid".to_string(),
        kind: DbKind::Mysql,
        dump_args: Vec::new(),
        pre_hook: None,
        post_hook: None,
    };
    let (_, mut cleanup) = stage(&fixture, &target).await.unwrap();
    cleanup.drain().await;

    let dump_commands: Vec<String> = fixture
        .runtime
        .calls()
        .iter()
        .filter_map(|c| match c {
            RuntimeCall::Exec { command, .. } if command.contains("mysqldump") => {
                Some(command.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(dump_commands.len(), 2);
    assert!(dump_commands[0].contains("-uroot -p\"$MYSQL_ROOT_PASSWORD\""));
    assert!(dump_commands[1].contains("-u\"$MYSQL_USER\" -p\"$MYSQL_PASSWORD\""));
}

#[tokio::test]
async fn mariadb_uses_mariadb_dump_and_env() {
    let fixture = fixture().await;
    fixture.runtime.add_container(ContainerInfo {
        id: "maria-cid".to_string(),
        name: "maria".to_string(),
        image: "mariadb:11".to_string(),
        running: true,
        mounts: Vec::new(),
    });
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b"dump"));

    let target = DatabaseTarget {
        name: "maria".to_string(),
        container_id: "maria-cid".to_string(),
        kind: DbKind::Mariadb,
        dump_args: Vec::new(),
        pre_hook: None,
        post_hook: None,
    };
    let (_, mut cleanup) = stage(&fixture, &target).await.unwrap();
    cleanup.drain().await;

    assert!(fixture.runtime.calls().iter().any(|c| matches!(
        c,
        RuntimeCall::Exec { command, .. }
            if command.contains("mariadb-dump") && command.contains("$MARIADB_ROOT_PASSWORD")
    )));
}

#[tokio::test]
async fn mongo_dump_writes_archive() {
    let fixture = fixture().await;
    fixture.runtime.add_container(ContainerInfo {
        id: "mongo-cid".to_string(),
        name: "mongo-main".to_string(),
        image: "mongo:7".to_string(),
        running: true,
        mounts: Vec::new(),
    });
    fixture
        .runtime
        .script_copy("dump.archive", tar_with_file("dump.archive", b"bson"));

    let target = DatabaseTarget {
        name: "mongo-main".to_string(),
        container_id: "mongo-cid".to_string(),
        kind: DbKind::Mongo,
        dump_args: Vec::new(),
        pre_hook: None,
        post_hook: None,
    };
    let (staged, mut cleanup) = stage(&fixture, &target).await.unwrap();
    assert!(staged[0].ends_with("db/mongo-main/dump.archive"));
    cleanup.drain().await;
}

#[tokio::test]
async fn failed_dump_cleans_up_immediately() {
    let fixture = fixture().await;
    fixture
        .runtime
        .script_exec("pg_dumpall", Err((1, "connection refused")));

    let err = stage(&fixture, &postgres_target()).await.unwrap_err();
    assert!(matches!(err, StageError::Dump(msg) if msg.contains("connection refused")));

    // error path drained the chain: scratch dir removed, stage dir gone
    assert!(fixture.runtime.calls().iter().any(|c| matches!(
        c,
        RuntimeCall::Exec { command, .. } if command.contains("rm -rf")
    )));
    assert!(!fixture.paths.local_root.join("local").exists());
}

#[tokio::test]
async fn empty_dump_is_rejected() {
    let fixture = fixture().await;
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b""));

    let err = stage(&fixture, &postgres_target()).await.unwrap_err();
    assert!(matches!(err, StageError::EmptyStage));
}

#[tokio::test]
async fn missing_container_is_rejected() {
    let fixture = fixture().await;
    let mut target = postgres_target();
    target.name = "ghost".to_string();
    let err = stage(&fixture, &target).await.unwrap_err();
    assert!(matches!(err, StageError::ContainerNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn clean_dump_emits_no_warnings() {
    let fixture = fixture().await;
    fixture
        .runtime
        .script_copy("dump.sql", tar_with_file("dump.sql", b"abc"));
    let (_, mut cleanup) = stage(&fixture, &postgres_target()).await.unwrap();
    cleanup.drain().await;

    let warnings = fixture
        .store
        .system_logs(marina_core::LogLevel::Warn, 100)
        .await
        .unwrap();
    assert!(warnings.is_empty());
}
