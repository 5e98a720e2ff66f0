// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule listing, merged across the mesh

use super::{is_mesh, ApiError, AppState};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use marina_core::BackupScheduleView;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ScheduleResponse {
    pub node: String,
    #[serde(flatten)]
    pub schedule: BackupScheduleView,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScheduleResponse>>, ApiError> {
    let mut out: Vec<ScheduleResponse> = state
        .store
        .schedules()
        .await?
        .into_iter()
        .map(|schedule| ScheduleResponse {
            node: state.node_name.clone(),
            schedule,
        })
        .collect();

    if !is_mesh(&headers) && state.federation.has_peers() {
        let names = state.federation.node_infos().await;
        for peer in state.federation.fetch_schedules().await {
            match peer.result {
                Ok(schedules) => {
                    let node = names
                        .get(&peer.peer)
                        .map(|i| i.node_name.clone())
                        .unwrap_or_else(|| peer.peer.clone());
                    out.extend(schedules.into_iter().map(|schedule| ScheduleResponse {
                        node: node.clone(),
                        schedule,
                    }));
                }
                Err(e) if e.is_silent() => {}
                Err(e) => {
                    state
                        .logger
                        .warn(format!("peer {}: schedules unavailable: {e}", peer.peer))
                        .await;
                }
            }
        }
    }

    Ok(Json(out))
}
