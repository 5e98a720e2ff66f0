// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<AtomicUsize>,
    logins: Arc<AtomicUsize>,
    /// Tokens the protected endpoint accepts; empty disables auth.
    accepted_tokens: Arc<parking_lot::Mutex<Vec<String>>>,
    /// Tokens login hands out, in order; the last one repeats.
    minted_tokens: Arc<parking_lot::Mutex<Vec<String>>>,
    fail_with_500: bool,
}

async fn schedules_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if headers.get(MESH_HEADER).map(|v| v.to_str().unwrap_or("")) != Some("true") {
        return Err(StatusCode::BAD_REQUEST);
    }
    if state.fail_with_500 {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let accepted = state.accepted_tokens.lock();
    if !accepted.is_empty() {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| accepted.iter().any(|a| a == t))
            .unwrap_or(false);
        if !authorized {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(Json(serde_json::json!([{
        "instanceId": "remote",
        "cron": "* * * * *",
        "nextRunAt": null,
        "retention": {"keepDaily": 7, "keepWeekly": 4, "keepMonthly": 6},
        "targetIds": ["volume:app-data"],
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
    }])))
}

async fn login_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let count = state.logins.fetch_add(1, Ordering::SeqCst);
    let minted = state.minted_tokens.lock();
    let token = minted
        .get(count)
        .or_else(|| minted.last())
        .cloned()
        .unwrap_or_default();
    Json(serde_json::json!({"success": true, "token": token}))
}

async fn spawn_server(state: ServerState) -> String {
    let app = Router::new()
        .route("/api/schedules/", get(schedules_handler))
        .route("/api/auth/login", post(login_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fan_out_decodes_peer_schedules() {
    let state = ServerState::default();
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![url.clone()], None).unwrap();

    let results = client.fetch_schedules().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].peer, url);
    let schedules = results[0].result.as_ref().unwrap();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].instance_id, "remote");
    assert_eq!(schedules[0].target_ids[0].as_str(), "volume:app-data");
}

#[tokio::test]
async fn login_token_is_cached_across_requests() {
    let state = ServerState::default();
    state.accepted_tokens.lock().push("tok-1".to_string());
    state.minted_tokens.lock().push("tok-1".to_string());
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![url], Some("pw".to_string())).unwrap();

    assert!(client.fetch_schedules().await[0].result.is_ok());
    assert!(client.fetch_schedules().await[0].result.is_ok());
    assert_eq!(state.logins.load(Ordering::SeqCst), 1, "token reused");
}

#[tokio::test]
async fn retries_once_with_fresh_token_after_401() {
    let state = ServerState::default();
    // only the second minted token is valid
    state.accepted_tokens.lock().push("tok-2".to_string());
    *state.minted_tokens.lock() = vec!["tok-1".to_string(), "tok-2".to_string()];
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![url], Some("pw".to_string())).unwrap();

    let results = client.fetch_schedules().await;
    assert!(results[0].result.is_ok(), "got {:?}", results[0].result);
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_password_yields_skipped_peer_on_auth() {
    let state = ServerState::default();
    state.accepted_tokens.lock().push("tok".to_string());
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![url], None).unwrap();

    let results = client.fetch_schedules().await;
    assert_eq!(results[0].result, Err(PeerError::Status(401)));
    assert_eq!(state.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn three_failures_open_the_circuit_and_stop_requests() {
    let state = ServerState {
        fail_with_500: true,
        ..Default::default()
    };
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![url], None).unwrap();

    for _ in 0..3 {
        let results = client.fetch_schedules().await;
        assert_eq!(results[0].result, Err(PeerError::Status(500)));
    }
    assert_eq!(state.requests.load(Ordering::SeqCst), 3);

    // circuit open: no request reaches the peer
    let results = client.fetch_schedules().await;
    assert_eq!(results[0].result, Err(PeerError::InBackoff));
    assert!(results[0].result.as_ref().unwrap_err().is_silent());
    assert_eq!(state.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unreachable_peer_reports_http_error() {
    let client = FederationClient::new(vec!["http://127.0.0.1:9".to_string()], None).unwrap();
    let results = client.fetch_schedules().await;
    assert!(matches!(results[0].result, Err(PeerError::Http(_))));
}

#[tokio::test]
async fn trailing_slashes_are_normalized() {
    let state = ServerState::default();
    let url = spawn_server(state.clone()).await;
    let client = FederationClient::new(vec![format!("{url}/")], None).unwrap();
    let results = client.fetch_schedules().await;
    assert!(results[0].result.is_ok());
}
