// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    seconds = { "45s", 45 },
    minutes = { "60m", 3600 },
    hours = { "2h", 7200 },
    combined = { "1h30m", 5400 },
    all_units = { "1h1m1s", 3661 },
)]
fn parses_seconds(input: &str, secs: u64) {
    assert_eq!(parse_duration(input).unwrap(), Duration::from_secs(secs));
}

#[test]
fn parses_millis() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(
        parse_duration("1s500ms").unwrap(),
        Duration::from_millis(1500)
    );
}

#[parameterized(
    empty = { "" },
    bare_number = { "30" },
    bare_unit = { "h" },
    unknown_unit = { "3x" },
    trailing_count = { "1h30" },
)]
fn rejects(input: &str) {
    assert!(parse_duration(input).is_err());
}
