// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance backup schedules

use crate::{BackupTarget, InstanceId, Retention, TargetId};
use serde::{Deserialize, Serialize};

/// One instance's resolved backup schedule: a validated cron expression
/// plus the targets to stage and the retention policy to apply.
///
/// Produced deterministically by the schedule builder from configuration
/// and a runtime snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceBackupSchedule {
    pub instance_id: InstanceId,
    /// Five-field cron expression (minute hour dom month dow).
    pub cron: String,
    pub targets: Vec<BackupTarget>,
    pub retention: Retention,
}

impl InstanceBackupSchedule {
    pub fn target_ids(&self) -> Vec<TargetId> {
        self.targets.iter().map(|t| t.id()).collect()
    }

    /// Scheduling equivalence: same cron string and same multiset of
    /// target ids. Other fields influence execution, not identity, so a
    /// sync does not re-register an entry over them.
    pub fn is_equivalent(&self, other: &InstanceBackupSchedule) -> bool {
        if self.cron != other.cron {
            return false;
        }
        let mut a = self.target_ids();
        let mut b = other.target_ids();
        a.sort();
        b.sort();
        a == b
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
