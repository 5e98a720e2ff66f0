// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured log sink
//!
//! Every record is written to the store and emitted as a tracing event
//! under one lock, so the text stream's line order matches the database
//! insertion order.

use crate::store::NewLogRecord;
use crate::Store;
use chrono::Utc;
use marina_core::{InstanceId, LogLevel, TargetId};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct LogContext {
    instance_id: Option<InstanceId>,
    target_id: Option<TargetId>,
    job_status_id: Option<i64>,
    job_status_iid: Option<i64>,
}

/// Dual-sink structured logger, optionally scoped to an instance, a
/// target, and a job execution.
///
/// Derived loggers (`with_*`) share the parent's write lock, so all
/// scopes serialize against each other.
#[derive(Clone)]
pub struct JobLogger {
    store: Store,
    write_lock: Arc<Mutex<()>>,
    ctx: LogContext,
}

impl JobLogger {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
            ctx: LogContext::default(),
        }
    }

    /// Derive a logger scoped to an instance.
    pub fn with_instance(&self, instance_id: &InstanceId) -> Self {
        let mut logger = self.clone();
        logger.ctx.instance_id = Some(instance_id.clone());
        logger
    }

    /// Derive a logger scoped to a target.
    pub fn with_target(&self, target_id: &TargetId) -> Self {
        let mut logger = self.clone();
        logger.ctx.target_id = Some(target_id.clone());
        logger
    }

    /// Derive a logger scoped to a job execution.
    pub fn with_job(&self, job_status_id: i64, job_status_iid: i64) -> Self {
        let mut logger = self.clone();
        logger.ctx.job_status_id = Some(job_status_id);
        logger.ctx.job_status_iid = Some(job_status_iid);
        logger
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into()).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into()).await;
    }

    /// Write one record to both sinks. A store failure downgrades to a
    /// tracing warning; logging never fails the caller.
    pub async fn log(&self, level: LogLevel, message: String) {
        let _guard = self.write_lock.lock().await;

        let record = NewLogRecord {
            timestamp: Utc::now(),
            level,
            message,
            instance_id: self.ctx.instance_id.as_ref().map(|i| i.to_string()),
            target_id: self.ctx.target_id.as_ref().map(|t| t.to_string()),
            job_status_id: self.ctx.job_status_id,
            job_status_iid: self.ctx.job_status_iid,
        };
        if let Err(e) = self.store.insert_log(&record).await {
            tracing::warn!(error = %e, "failed to persist log record");
        }

        let instance = record.instance_id.as_deref().unwrap_or("-");
        let target = record.target_id.as_deref().unwrap_or("-");
        match level {
            LogLevel::Debug => {
                tracing::debug!(instance, target, job = record.job_status_id, "{}", record.message)
            }
            LogLevel::Info => {
                tracing::info!(instance, target, job = record.job_status_id, "{}", record.message)
            }
            LogLevel::Warn => {
                tracing::warn!(instance, target, job = record.job_status_id, "{}", record.message)
            }
            LogLevel::Error => {
                tracing::error!(instance, target, job = record.job_status_id, "{}", record.message)
            }
        }
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
