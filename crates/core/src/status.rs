// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted job status, log records, and schedule views

use crate::{InstanceId, Retention, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a backup job execution.
///
/// Created `Scheduled` at cron tick, `InProgress` at stage start, then
/// one of the three terminal outcomes. Rows found `Scheduled` or
/// `InProgress` at process start are coerced to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    InProgress,
    Success,
    PartialSuccess,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::PartialSuccess | JobState::Failed | JobState::Aborted
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::InProgress => write!(f, "in_progress"),
            JobState::Success => write!(f, "success"),
            JobState::PartialSuccess => write!(f, "partial_success"),
            JobState::Failed => write!(f, "failed"),
            JobState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job state: {0}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobState::Scheduled),
            "in_progress" => Ok(JobState::InProgress),
            "success" => Ok(JobState::Success),
            "partial_success" => Ok(JobState::PartialSuccess),
            "failed" => Ok(JobState::Failed),
            "aborted" => Ok(JobState::Aborted),
            other => Err(ParseJobStateError(other.to_string())),
        }
    }
}

/// One persisted job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Process-wide monotonic row id.
    pub id: i64,
    /// Per-instance monotonic execution id, starting at 1.
    pub iid: i64,
    pub instance_id: InstanceId,
    /// Cleared when the instance is removed from configuration.
    pub is_active: bool,
    pub status: JobState,
    pub last_targets_successful: i64,
    pub last_targets_total: i64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(ParseLogLevelError(other.to_string())),
        }
    }
}

/// One structured log record, optionally scoped to an instance, a target,
/// and a job execution. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status_iid: Option<i64>,
}

/// Persisted mirror of one entry in the runner's active schedule set.
///
/// The runner's in-memory map is the truth; this row exists so the API
/// can return schedules without consulting the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleView {
    pub instance_id: InstanceId,
    pub cron: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub retention: Retention,
    pub target_ids: Vec<TargetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
