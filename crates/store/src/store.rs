// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite store for job statuses, logs, and schedule views

use crate::StoreError;
use chrono::{DateTime, Utc};
use marina_core::{BackupScheduleView, InstanceId, JobState, JobStatus, LogLevel, LogRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for bulk statements (schedule rewrites, pruning).
const BULK_TIMEOUT: Duration = Duration::from_secs(10);
const SCHEMA_ATTEMPTS: u32 = 5;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    iid INTEGER NOT NULL,
    instance_id TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    last_targets_successful INTEGER NOT NULL DEFAULT 0,
    last_targets_total INTEGER NOT NULL DEFAULT 0,
    last_started_at TEXT,
    last_completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (iid, instance_id)
);
CREATE INDEX IF NOT EXISTS idx_job_status_instance ON job_status (instance_id);
CREATE INDEX IF NOT EXISTS idx_job_status_status ON job_status (status);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    instance_id TEXT,
    target_id TEXT,
    job_status_id INTEGER,
    job_status_iid INTEGER
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_level ON logs (level);
CREATE INDEX IF NOT EXISTS idx_logs_job_status_id ON logs (job_status_id);
CREATE INDEX IF NOT EXISTS idx_logs_job_status_iid ON logs (job_status_iid);

CREATE TABLE IF NOT EXISTS backup_schedules (
    instance_id TEXT PRIMARY KEY,
    cron TEXT NOT NULL,
    next_run_at TEXT,
    retention TEXT NOT NULL,
    target_ids TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Handle to the SQLite store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Fields of a log record before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewLogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub instance_id: Option<String>,
    pub target_id: Option<String>,
    pub job_status_id: Option<i64>,
    pub job_status_iid: Option<i64>,
}

impl Store {
    /// Open (creating if missing) the store at `path` in WAL mode.
    ///
    /// Schema creation is retried with exponential backoff to tolerate a
    /// concurrent first-init by another process sharing the file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let mut delay = Duration::from_millis(100);
        let mut last_err = None;
        for _ in 0..SCHEMA_ATTEMPTS {
            match sqlx::raw_sql(SCHEMA).execute(&self.pool).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(last_err.map(StoreError::Sqlx).unwrap_or(StoreError::Timeout))
    }

    // ---- job status ----

    /// Insert a new job row in state `scheduled`. The per-instance `iid`
    /// is assigned inside the INSERT so concurrent ticks cannot collide.
    pub async fn insert_job(
        &self,
        instance_id: &InstanceId,
        targets_total: i64,
    ) -> Result<(i64, i64), StoreError> {
        let now = Utc::now();
        let row: (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO job_status
                (iid, instance_id, is_active, status,
                 last_targets_successful, last_targets_total, created_at, updated_at)
            VALUES
                ((SELECT COALESCE(MAX(iid), 0) + 1 FROM job_status WHERE instance_id = ?1),
                 ?1, 1, 'scheduled', 0, ?2, ?3, ?3)
            RETURNING id, iid
            "#,
        )
        .bind(instance_id.as_str())
        .bind(targets_total)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Transition to `in_progress` and stamp `last_started_at`.
    pub async fn mark_job_started(&self, id: i64) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE job_status SET status = 'in_progress', last_started_at = ?1, updated_at = ?1
             WHERE id = ?2",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a terminal state with the per-target tallies.
    pub async fn finish_job(
        &self,
        id: i64,
        state: JobState,
        targets_successful: i64,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE job_status
             SET status = ?1, last_targets_successful = ?2, last_completed_at = ?3, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(state.to_string())
        .bind(targets_successful)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Coerce any row still `scheduled` or `in_progress` to `aborted`.
    /// Run once at process start; returns the number of rows coerced.
    pub async fn abort_stale_jobs(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE job_status SET status = 'aborted', updated_at = ?1
             WHERE status IN ('scheduled', 'in_progress')",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Clear `is_active` for every job of a removed instance.
    pub async fn deactivate_instance_jobs(
        &self,
        instance_id: &InstanceId,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE job_status SET is_active = 0, updated_at = ?1 WHERE instance_id = ?2",
        )
        .bind(now)
        .bind(instance_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All job rows for an instance, newest execution first.
    pub async fn job_statuses(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<JobStatus>, StoreError> {
        let rows: Vec<JobStatusRow> = sqlx::query_as(
            "SELECT * FROM job_status WHERE instance_id = ?1 ORDER BY iid DESC",
        )
        .bind(instance_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobStatus::try_from).collect()
    }

    pub async fn job_status(&self, id: i64) -> Result<Option<JobStatus>, StoreError> {
        let row: Option<JobStatusRow> =
            sqlx::query_as("SELECT * FROM job_status WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(JobStatus::try_from).transpose()
    }

    // ---- logs ----

    pub async fn insert_log(&self, record: &NewLogRecord) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO logs
                (timestamp, level, message, instance_id, target_id, job_status_id, job_status_iid)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id
            "#,
        )
        .bind(record.timestamp)
        .bind(record.level.to_string())
        .bind(&record.message)
        .bind(&record.instance_id)
        .bind(&record.target_id)
        .bind(record.job_status_id)
        .bind(record.job_status_iid)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Logs for one job execution, in insertion order.
    pub async fn job_logs(&self, job_status_id: i64, limit: i64) -> Result<Vec<LogRecord>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT * FROM logs WHERE job_status_id = ?1 ORDER BY id ASC LIMIT ?2",
        )
        .bind(job_status_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRecord::try_from).collect()
    }

    /// System logs (no job association) at or above `min_level`, newest
    /// first.
    pub async fn system_logs(
        &self,
        min_level: LogLevel,
        limit: i64,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let levels: Vec<String> = [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
            .into_iter()
            .filter(|l| *l >= min_level)
            .map(|l| l.to_string())
            .collect();
        // level set is tiny and fixed, so an IN list is fine
        let placeholders = vec!["?"; levels.len()].join(", ");
        let sql = format!(
            "SELECT * FROM logs WHERE job_status_id IS NULL AND level IN ({placeholders})
             ORDER BY timestamp DESC LIMIT ?"
        );
        let mut query = sqlx::query_as::<_, LogRow>(&sql);
        for level in &levels {
            query = query.bind(level.clone());
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.into_iter().map(LogRecord::try_from).collect()
    }

    /// Delete logs older than `cutoff`; returns the number removed.
    pub async fn prune_logs(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = bulk(
            sqlx::query("DELETE FROM logs WHERE timestamp < ?1")
                .bind(cutoff)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    // ---- schedules ----

    /// Atomically overwrite the mirrored schedule set.
    pub async fn replace_schedules(
        &self,
        views: &[BackupScheduleView],
    ) -> Result<(), StoreError> {
        bulk(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM backup_schedules")
                .execute(&mut *tx)
                .await?;
            for view in views {
                sqlx::query(
                    r#"
                    INSERT INTO backup_schedules
                        (instance_id, cron, next_run_at, retention, target_ids, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(view.instance_id.as_str())
                .bind(&view.cron)
                .bind(view.next_run_at)
                .bind(view.retention.to_string())
                .bind(serde_json::to_string(&view.target_ids).unwrap_or_default())
                .bind(view.created_at)
                .bind(view.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await
        })
        .await?;
        Ok(())
    }

    /// Best-effort refresh of one instance's next fire time.
    pub async fn update_next_run(
        &self,
        instance_id: &InstanceId,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE backup_schedules SET next_run_at = ?1, updated_at = ?2 WHERE instance_id = ?3",
        )
        .bind(next_run_at)
        .bind(now)
        .bind(instance_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn schedules(&self) -> Result<Vec<BackupScheduleView>, StoreError> {
        let rows: Vec<ScheduleRow> =
            sqlx::query_as("SELECT * FROM backup_schedules ORDER BY instance_id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(BackupScheduleView::try_from).collect()
    }
}

/// Bound a bulk statement by [`BULK_TIMEOUT`].
async fn bulk<T>(
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(BULK_TIMEOUT, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout),
    }
}

#[derive(FromRow)]
struct JobStatusRow {
    id: i64,
    iid: i64,
    instance_id: String,
    is_active: bool,
    status: String,
    last_targets_successful: i64,
    last_targets_total: i64,
    last_started_at: Option<DateTime<Utc>>,
    last_completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobStatusRow> for JobStatus {
    type Error = StoreError;

    fn try_from(row: JobStatusRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("job_status.status: {e}")))?;
        Ok(JobStatus {
            id: row.id,
            iid: row.iid,
            instance_id: InstanceId::new(row.instance_id),
            is_active: row.is_active,
            status,
            last_targets_successful: row.last_targets_successful,
            last_targets_total: row.last_targets_total,
            last_started_at: row.last_started_at,
            last_completed_at: row.last_completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: i64,
    timestamp: DateTime<Utc>,
    level: String,
    message: String,
    instance_id: Option<String>,
    target_id: Option<String>,
    job_status_id: Option<i64>,
    job_status_iid: Option<i64>,
}

impl TryFrom<LogRow> for LogRecord {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let level = row
            .level
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("logs.level: {e}")))?;
        Ok(LogRecord {
            id: row.id,
            timestamp: row.timestamp,
            level,
            message: row.message,
            instance_id: row.instance_id.map(InstanceId::new),
            target_id: row.target_id.map(Into::into),
            job_status_id: row.job_status_id,
            job_status_iid: row.job_status_iid,
        })
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    instance_id: String,
    cron: String,
    next_run_at: Option<DateTime<Utc>>,
    retention: String,
    target_ids: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for BackupScheduleView {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let retention = row
            .retention
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("backup_schedules.retention: {e}")))?;
        let target_ids = serde_json::from_str(&row.target_ids)?;
        Ok(BackupScheduleView {
            instance_id: InstanceId::new(row.instance_id),
            cron: row.cron,
            next_run_at: row.next_run_at,
            retention,
            target_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
