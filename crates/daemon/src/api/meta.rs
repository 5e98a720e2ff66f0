// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and identity endpoints

use super::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use marina_federation::NodeInfo;

pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": Utc::now(),
    }))
}

pub(crate) async fn info(State(state): State<AppState>) -> Json<NodeInfo> {
    Json(NodeInfo {
        node_name: state.node_name.clone(),
        version: state.version.clone(),
    })
}
