// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn lookup(name: &str) -> Option<String> {
    match name {
        "HOST" => Some("db.internal".to_string()),
        "PASSWORD" => Some("s3cret".to_string()),
        _ => None,
    }
}

fn roundtrip(yaml: &str) -> serde_yaml::Value {
    let mut value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
    interpolate(&mut value, &lookup);
    value
}

#[test]
fn braced_and_bare_forms() {
    let value = roundtrip("a: ${HOST}\nb: $HOST\n");
    assert_eq!(value["a"], "db.internal");
    assert_eq!(value["b"], "db.internal");
}

#[test]
fn unset_variables_expand_empty() {
    let value = roundtrip("a: prefix-${MISSING}-suffix\n");
    assert_eq!(value["a"], "prefix--suffix");
}

#[test]
fn nested_sequences_and_mappings() {
    let value = roundtrip("outer:\n  - inner: pw=$PASSWORD\n  - plain\n");
    assert_eq!(value["outer"][0]["inner"], "pw=s3cret");
    assert_eq!(value["outer"][1], "plain");
}

#[test]
fn non_strings_untouched() {
    let value = roundtrip("n: 42\nb: true\n");
    assert_eq!(value["n"], 42);
    assert_eq!(value["b"], true);
}

#[test]
fn multiple_occurrences_in_one_string() {
    let value = roundtrip("url: postgres://$HOST/${HOST}\n");
    assert_eq!(value["url"], "postgres://db.internal/db.internal");
}
