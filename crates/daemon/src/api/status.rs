// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status listing, merged across the mesh

use super::{is_mesh, ApiError, AppState};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use marina_core::{InstanceId, JobStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub node: String,
    #[serde(flatten)]
    pub status: JobStatus,
}

pub(crate) async fn for_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<StatusResponse>>, ApiError> {
    let mut out: Vec<StatusResponse> = state
        .store
        .job_statuses(&InstanceId::new(instance_id.clone()))
        .await?
        .into_iter()
        .map(|status| StatusResponse {
            node: state.node_name.clone(),
            status,
        })
        .collect();

    if !is_mesh(&headers) && state.federation.has_peers() {
        let names = state.federation.node_infos().await;
        for peer in state.federation.fetch_statuses(&instance_id).await {
            match peer.result {
                Ok(statuses) => {
                    let node = names
                        .get(&peer.peer)
                        .map(|i| i.node_name.clone())
                        .unwrap_or_else(|| peer.peer.clone());
                    out.extend(statuses.into_iter().map(|status| StatusResponse {
                        node: node.clone(),
                        status,
                    }));
                }
                Err(e) if e.is_silent() => {}
                Err(e) => {
                    state
                        .logger
                        .warn(format!("peer {}: statuses unavailable: {e}", peer.peer))
                        .await;
                }
            }
        }
    }

    Ok(Json(out))
}
