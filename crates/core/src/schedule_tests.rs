// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{DatabaseTarget, DbKind, VolumeTarget};

fn volume(name: &str) -> BackupTarget {
    BackupTarget::Volume(VolumeTarget {
        name: name.to_string(),
        paths: vec!["/".to_string()],
        stop_attached: false,
        pre_hook: None,
        post_hook: None,
    })
}

fn database(name: &str, cid: &str) -> BackupTarget {
    BackupTarget::Database(DatabaseTarget {
        name: name.to_string(),
        container_id: cid.to_string(),
        kind: DbKind::Postgres,
        dump_args: vec![],
        pre_hook: None,
        post_hook: None,
    })
}

fn schedule(cron: &str, targets: Vec<BackupTarget>) -> InstanceBackupSchedule {
    InstanceBackupSchedule {
        instance_id: "local".into(),
        cron: cron.to_string(),
        targets,
        retention: Retention::new(7, 4, 6),
    }
}

#[test]
fn equivalent_ignores_target_order() {
    let a = schedule("* * * * *", vec![volume("a"), database("pg", "c1")]);
    let b = schedule("* * * * *", vec![database("pg", "c1"), volume("a")]);
    assert!(a.is_equivalent(&b));
}

#[test]
fn cron_change_breaks_equivalence() {
    let a = schedule("* * * * *", vec![volume("a")]);
    let b = schedule("0 3 * * *", vec![volume("a")]);
    assert!(!a.is_equivalent(&b));
}

#[test]
fn container_id_change_breaks_equivalence() {
    // a recreated database container gets a new id, which re-registers
    let a = schedule("* * * * *", vec![database("pg", "c1")]);
    let b = schedule("* * * * *", vec![database("pg", "c2")]);
    assert!(!a.is_equivalent(&b));
}

#[test]
fn retention_change_keeps_equivalence() {
    let a = schedule("* * * * *", vec![volume("a")]);
    let mut b = a.clone();
    b.retention = Retention::new(1, 1, 1);
    assert!(a.is_equivalent(&b));
}
