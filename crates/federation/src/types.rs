// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types shared between the federation client and the API server

use crate::PeerError;
use chrono::{DateTime, Utc};
use marina_core::LogLevel;
use serde::{Deserialize, Serialize};

/// One peer's answer in a fan-out.
#[derive(Debug, Clone)]
pub struct PeerResult<T> {
    pub peer: String,
    pub result: Result<T, PeerError>,
}

/// Identity a node reports on `/api/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_name: String,
    pub version: String,
}

/// A system log record as served over the API.
///
/// `id` is namespaced `{nodeName}:{localId}` so ids stay unique across
/// a merged set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLogEntry {
    pub id: String,
    pub node: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}
