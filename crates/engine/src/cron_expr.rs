// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron expressions
//!
//! Configuration uses the classic five-field grammar (minute hour dom
//! month dow); the `cron` crate wants a seconds field, so parsing pins
//! seconds to zero.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),
    #[error("invalid cron expression: {0}")]
    Invalid(#[from] cron::error::Error),
}

/// Parse and validate a five-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, CronError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(CronError::FieldCount(fields));
    }
    Ok(Schedule::from_str(&format!("0 {expr}"))?)
}

/// The schedule's next fire time after now.
pub fn next_run(schedule: &Schedule) -> Option<DateTime<Utc>> {
    schedule.upcoming(Utc).next()
}

#[cfg(test)]
#[path = "cron_expr_tests.rs"]
mod tests;
