// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Store;
use marina_core::LogLevel;
use tempfile::TempDir;

async fn setup() -> (TempDir, Store, JobLogger) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("marina.db")).await.unwrap();
    let logger = JobLogger::new(store.clone());
    (dir, store, logger)
}

#[tokio::test]
async fn unscoped_records_are_system_logs() {
    let (_dir, store, logger) = setup().await;
    logger.info("starting up").await;

    let logs = store.system_logs(LogLevel::Debug, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "starting up");
    assert_eq!(logs[0].level, LogLevel::Info);
    assert!(logs[0].instance_id.is_none());
}

#[tokio::test]
async fn job_scoped_records_carry_full_context() {
    let (_dir, store, logger) = setup().await;
    let scoped = logger
        .with_instance(&"local".into())
        .with_job(42, 3)
        .with_target(&TargetId::volume("app-data"));
    scoped.warn("volume went missing").await;

    let logs = store.job_logs(42, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    let record = &logs[0];
    assert_eq!(record.level, LogLevel::Warn);
    assert_eq!(record.instance_id.as_ref().unwrap().as_str(), "local");
    assert_eq!(record.target_id.as_ref().unwrap().as_str(), "volume:app-data");
    assert_eq!(record.job_status_iid, Some(3));

    // scoping does not leak into the parent
    logger.info("unscoped").await;
    let system = store.system_logs(LogLevel::Debug, 10).await.unwrap();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].message, "unscoped");
}

#[tokio::test]
async fn sequential_writes_keep_insertion_order() {
    let (_dir, store, logger) = setup().await;
    let scoped = logger.with_job(1, 1);
    for i in 0..5 {
        scoped.debug(format!("step {i}")).await;
    }

    let logs = store.job_logs(1, 10).await.unwrap();
    let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["step 0", "step 1", "step 2", "step 3", "step 4"]);
}
