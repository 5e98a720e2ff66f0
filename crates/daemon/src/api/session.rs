// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login, logout, and auth introspection

use super::{ApiError, AppState};
use crate::auth::{LoginOutcome, TOKEN_COOKIE};
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    #[serde(default)]
    password: String,
}

pub(crate) async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    match state.auth.login(&body.password) {
        LoginOutcome::Disabled => Ok((jar, Json(serde_json::json!({ "success": true })))),
        LoginOutcome::Token(token) => {
            let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            Ok((
                jar.add(cookie),
                Json(serde_json::json!({ "success": true, "token": token })),
            ))
        }
        LoginOutcome::Rejected => Err(ApiError(
            StatusCode::UNAUTHORIZED,
            "invalid password".to_string(),
        )),
    }
}

pub(crate) async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(token) = presented_token(&jar, &headers) {
        state.auth.invalidate(&token);
    }
    let jar = jar.remove(Cookie::from(TOKEN_COOKIE));
    (jar, Json(serde_json::json!({ "success": true })))
}

pub(crate) async fn check(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let required = state.auth.required();
    let authenticated = !required
        || presented_token(&jar, &headers)
            .map(|token| state.auth.is_valid(&token))
            .unwrap_or(false);
    Json(serde_json::json!({
        "authRequired": required,
        "authenticated": authenticated,
    }))
}

fn presented_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()))
}
