// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot retention policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How many daily/weekly/monthly snapshots to keep after a backup.
///
/// A bucket of zero means "do not enforce that bucket" and its flag is
/// omitted when invoking the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
}

impl Retention {
    pub fn new(keep_daily: u32, keep_weekly: u32, keep_monthly: u32) -> Self {
        Self {
            keep_daily,
            keep_weekly,
            keep_monthly,
        }
    }

    /// True when no bucket is enforced, i.e. retention is a no-op.
    pub fn is_empty(&self) -> bool {
        self.keep_daily == 0 && self.keep_weekly == 0 && self.keep_monthly == 0
    }
}

/// Errors parsing the `"<D>d:<W>w:<M>m"` retention string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionParseError {
    #[error("empty retention string")]
    Empty,
    #[error("invalid retention segment: {0}")]
    InvalidSegment(String),
    #[error("duplicate retention bucket: {0}")]
    DuplicateBucket(char),
}

impl FromStr for Retention {
    type Err = RetentionParseError;

    /// Parse `"7d:4w:6m"`. Segments may appear in any order; each bucket
    /// at most once; omitted buckets default to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RetentionParseError::Empty);
        }

        let mut retention = Retention::default();
        let mut seen = [false; 3];
        for segment in s.split(':') {
            let segment = segment.trim();
            let Some(unit) = segment.chars().last() else {
                return Err(RetentionParseError::InvalidSegment(segment.to_string()));
            };
            let count: u32 = segment[..segment.len() - 1]
                .parse()
                .map_err(|_| RetentionParseError::InvalidSegment(segment.to_string()))?;
            let (slot, bucket) = match unit {
                'd' => (0, &mut retention.keep_daily),
                'w' => (1, &mut retention.keep_weekly),
                'm' => (2, &mut retention.keep_monthly),
                _ => return Err(RetentionParseError::InvalidSegment(segment.to_string())),
            };
            if seen[slot] {
                return Err(RetentionParseError::DuplicateBucket(unit));
            }
            seen[slot] = true;
            *bucket = count;
        }
        Ok(retention)
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d:{}w:{}m",
            self.keep_daily, self.keep_weekly, self.keep_monthly
        )
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
