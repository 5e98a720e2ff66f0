// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable interpolation over a YAML tree

use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // ${VAR} or bare $VAR; names restricted to the usual shell charset
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
    })
}

/// Recursively replace `${VAR}` / `$VAR` in every string of the tree.
///
/// Unset variables expand to the empty string, matching shell `$VAR`
/// expansion semantics.
pub fn interpolate(value: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            let replaced = var_pattern().replace_all(s, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                lookup(name).unwrap_or_default()
            });
            if replaced.as_ref() != s.as_str() {
                *s = replaced.into_owned();
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                interpolate(item, lookup);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate(item, lookup);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "interpolate_tests.rs"]
mod tests;
