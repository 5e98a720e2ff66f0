// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration strings in the `"1h30m"` style

use crate::ConfigError;
use std::time::Duration;

/// Parse a duration string composed of `<n><unit>` segments, where unit
/// is one of `ms`, `s`, `m`, `h`. Segments accumulate: `"1h30m"` is 90
/// minutes.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let s = value.trim();
    if s.is_empty() {
        return Err(err(value, "empty"));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = s.chars().peekable();
    let mut matched = false;
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(err(value, "unit without count"));
        }
        let count: u64 = digits
            .parse()
            .map_err(|_| err(value, "count out of range"))?;
        digits.clear();
        let unit_secs = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                total += Duration::from_millis(count);
                matched = true;
                continue;
            }
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(err(value, "unknown unit")),
        };
        total += Duration::from_secs(count * unit_secs);
        matched = true;
    }
    if !digits.is_empty() {
        return Err(err(value, "trailing count without unit"));
    }
    if !matched {
        return Err(err(value, "no segments"));
    }
    Ok(total)
}

fn err(value: &str, reason: &str) -> ConfigError {
    ConfigError::Duration {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
