// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API
//!
//! Aggregating endpoints return local rows merged with peer fan-out;
//! a request carrying the mesh marker header gets local rows only, so
//! peer-to-peer calls cannot recurse.

pub mod logs;
pub mod meta;
pub mod schedules;
pub mod session;
pub mod status;

use crate::auth::{AuthState, TOKEN_COOKIE};
use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use marina_federation::{FederationClient, MESH_HEADER};
use marina_store::{JobLogger, Store, StoreError};
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub logger: JobLogger,
    pub federation: Arc<FederationClient>,
    pub auth: Arc<AuthState>,
    pub node_name: String,
    pub version: String,
}

/// Error response: status code plus a JSON error body.
pub(crate) struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.1 }));
        (self.0, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// Whether the request came from a peer node.
pub(crate) fn is_mesh(headers: &HeaderMap) -> bool {
    headers
        .get(MESH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Gate for protected routes: accept the token via cookie or bearer
/// header; no-op when auth is disabled.
pub(crate) async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.required() {
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let cookie_token = jar.get(TOKEN_COOKIE).map(|c| c.value().to_string());

    let authorized = header_token
        .or(cookie_token)
        .map(|token| state.auth.is_valid(&token))
        .unwrap_or(false);
    if authorized {
        next.run(request).await
    } else {
        ApiError(StatusCode::UNAUTHORIZED, "unauthorized".to_string()).into_response()
    }
}

/// Build the `/api` router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/info", get(meta::info))
        .route("/api/schedules/", get(schedules::list))
        .route("/api/status/:instance_id", get(status::for_instance))
        .route("/api/logs/job/:id", get(logs::job))
        .route("/api/logs/system", get(logs::system))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health", get(meta::health))
        .route("/api/auth/login", post(session::login))
        .route("/api/auth/logout", post(session::logout))
        .route("/api/auth/check", get(session::check))
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
