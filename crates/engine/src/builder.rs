// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule builder
//!
//! Pure transform from configuration plus a runtime snapshot into the
//! set of resolvable instance schedules. Unresolvable targets and
//! instances are skipped; the caller logs the returned warnings.

use crate::cron_expr::parse_cron;
use crate::RuntimeSnapshot;
use marina_config::{Config, InstanceConfig, TargetConfig};
use marina_core::{
    BackupTarget, DatabaseTarget, DbKind, InstanceBackupSchedule, InstanceId, VolumeTarget,
};
use std::fmt;

/// Why a target or instance was left out of the schedule set.
#[derive(Debug, Clone)]
pub struct BuildWarning {
    pub instance_id: InstanceId,
    pub target: Option<String>,
    pub reason: String,
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(
                f,
                "instance {}: target {}: {}",
                self.instance_id, target, self.reason
            ),
            None => write!(f, "instance {}: {}", self.instance_id, self.reason),
        }
    }
}

/// Build the schedule set. Deterministic for a given config and
/// snapshot.
pub fn build_schedules(
    config: &Config,
    snapshot: &RuntimeSnapshot,
) -> (Vec<InstanceBackupSchedule>, Vec<BuildWarning>) {
    let mut schedules = Vec::new();
    let mut warnings = Vec::new();

    for instance in &config.instances {
        if let Some(schedule) = build_instance(config, snapshot, instance, &mut warnings) {
            schedules.push(schedule);
        }
    }

    (schedules, warnings)
}

fn build_instance(
    config: &Config,
    snapshot: &RuntimeSnapshot,
    instance: &InstanceConfig,
    warnings: &mut Vec<BuildWarning>,
) -> Option<InstanceBackupSchedule> {
    let mut warn = |target: Option<String>, reason: String| {
        warnings.push(BuildWarning {
            instance_id: instance.id.clone(),
            target,
            reason,
        });
    };

    if let Err(e) = parse_cron(&instance.schedule) {
        warn(None, format!("invalid cron {:?}: {e}", instance.schedule));
        return None;
    }

    let mut targets = Vec::new();
    for target in &instance.targets {
        match resolve_target(config, snapshot, target) {
            Ok(resolved) => targets.push(resolved),
            Err(reason) => warn(Some(target_label(target)), reason),
        }
    }

    if targets.is_empty() {
        warn(None, "no resolvable targets".to_string());
        return None;
    }

    Some(InstanceBackupSchedule {
        instance_id: instance.id.clone(),
        cron: instance.schedule.clone(),
        targets,
        retention: instance.retention.unwrap_or(config.default_retention),
    })
}

fn resolve_target(
    config: &Config,
    snapshot: &RuntimeSnapshot,
    target: &TargetConfig,
) -> Result<BackupTarget, String> {
    match target {
        TargetConfig::Volume {
            name,
            paths,
            stop_attached,
            pre_hook,
            post_hook,
        } => {
            if !snapshot.has_volume(name) {
                return Err("volume not found".to_string());
            }
            Ok(BackupTarget::Volume(VolumeTarget {
                name: name.clone(),
                paths: paths.clone(),
                stop_attached: stop_attached.unwrap_or(config.default_stop_attached),
                pre_hook: pre_hook.clone(),
                post_hook: post_hook.clone(),
            }))
        }
        TargetConfig::Database {
            name,
            kind,
            dump_args,
            pre_hook,
            post_hook,
        } => {
            let container = snapshot
                .container_by_name(name)
                .ok_or_else(|| "container not found".to_string())?;
            let kind = match kind {
                Some(kind) => *kind,
                None => DbKind::infer_from_image(&container.image).ok_or_else(|| {
                    format!("cannot infer db kind from image {:?}", container.image)
                })?,
            };
            Ok(BackupTarget::Database(DatabaseTarget {
                name: name.clone(),
                container_id: container.id.clone(),
                kind,
                dump_args: dump_args.clone(),
                pre_hook: pre_hook.clone(),
                post_hook: post_hook.clone(),
            }))
        }
    }
}

fn target_label(target: &TargetConfig) -> String {
    match target {
        TargetConfig::Volume { name, .. } => format!("volume:{name}"),
        TargetConfig::Database { name, .. } => format!("db:{name}"),
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
