// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and system log endpoints

use super::{is_mesh, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use marina_core::{LogLevel, LogRecord};
use marina_federation::SystemLogEntry;
use serde::Deserialize;

const LIMIT_CAP: i64 = 5000;
const DEFAULT_LIMIT: i64 = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobLogQuery {
    node_url: Option<String>,
    limit: Option<i64>,
}

/// Logs for one job execution. With `nodeUrl` set the request is
/// delegated to that peer, which is the only node holding the rows.
pub(crate) async fn job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<JobLogQuery>,
) -> Result<Json<Vec<LogRecord>>, ApiError> {
    let limit = clamp_limit(query.limit);
    if let Some(peer) = query.node_url.filter(|p| !p.is_empty()) {
        let records = state
            .federation
            .fetch_job_logs(&peer, id, limit)
            .await
            .map_err(|e| {
                ApiError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("peer {peer}: {e}"),
                )
            })?;
        return Ok(Json(records));
    }
    Ok(Json(state.store.job_logs(id, limit).await?))
}

#[derive(Deserialize)]
pub(crate) struct SystemLogQuery {
    level: Option<String>,
    limit: Option<i64>,
}

/// System logs (no job association), merged across the mesh, newest
/// first.
pub(crate) async fn system(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SystemLogQuery>,
) -> Result<Json<Vec<SystemLogEntry>>, ApiError> {
    let limit = clamp_limit(query.limit);
    let level: LogLevel = match query.level.as_deref() {
        None | Some("") => LogLevel::Debug,
        Some(s) => s
            .parse()
            .map_err(|_| ApiError(StatusCode::BAD_REQUEST, format!("invalid level: {s}")))?,
    };

    let mut out: Vec<SystemLogEntry> = state
        .store
        .system_logs(level, limit)
        .await?
        .into_iter()
        .map(|record| to_entry(&state.node_name, record))
        .collect();

    if !is_mesh(&headers) && state.federation.has_peers() {
        for peer in state
            .federation
            .fetch_system_logs(&level.to_string(), limit)
            .await
        {
            match peer.result {
                Ok(entries) => out.extend(entries),
                Err(e) if e.is_silent() => {}
                Err(e) => {
                    state
                        .logger
                        .warn(format!("peer {}: system logs unavailable: {e}", peer.peer))
                        .await;
                }
            }
        }
    }

    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out.truncate(limit as usize);
    Ok(Json(out))
}

/// `{nodeName}:{localId}` keeps ids unique across the merged set.
fn to_entry(node: &str, record: LogRecord) -> SystemLogEntry {
    SystemLogEntry {
        id: format!("{node}:{}", record.id),
        node: node.to_string(),
        timestamp: record.timestamp,
        level: record.level,
        message: record.message,
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, LIMIT_CAP)
}
