// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Persistence layer for Marina
//!
//! A single SQLite file holds job statuses, structured logs, and the
//! mirrored schedule set. The [`JobLogger`] writes every record to the
//! store and to the tracing stream under one lock so both sinks agree
//! on ordering.

mod logger;
mod store;

pub use logger::JobLogger;
pub use store::{NewLogRecord, Store};

use thiserror::Error;

/// Errors from the persistence layer.
///
/// Job status updates treat these as best-effort (WARN): a broken
/// store must not halt a running backup.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("database operation timed out")]
    Timeout,
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
