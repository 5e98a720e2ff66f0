// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer fan-out client

use crate::circuit::Gate;
use crate::{NodeInfo, PeerError, PeerResult, SystemLogEntry, MESH_HEADER};
use futures::future::join_all;
use marina_core::{BackupScheduleView, JobStatus, LogRecord};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Overall client timeout; covers connect and slow bodies.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
/// Budget for one peer request within a fan-out.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
/// Budget for a token-minting login call.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    token: Option<String>,
}

/// Client for the configured peer list.
pub struct FederationClient {
    peers: Vec<String>,
    password: Option<String>,
    http: reqwest::Client,
    tokens: RwLock<HashMap<String, String>>,
    login_lock: tokio::sync::Mutex<()>,
    gate: Gate,
}

impl FederationClient {
    pub fn new(peers: Vec<String>, password: Option<String>) -> Result<Self, reqwest::Error> {
        let peers = peers
            .into_iter()
            .map(|p| p.trim_end_matches('/').to_string())
            .collect();
        Ok(Self {
            peers,
            password,
            http: reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?,
            tokens: RwLock::new(HashMap::new()),
            login_lock: tokio::sync::Mutex::new(()),
            gate: Gate::new(),
        })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn has_peers(&self) -> bool {
        !self.peers.is_empty()
    }

    pub async fn fetch_schedules(&self) -> Vec<PeerResult<Vec<BackupScheduleView>>> {
        self.fan_out("/api/schedules/").await
    }

    pub async fn fetch_statuses(&self, instance_id: &str) -> Vec<PeerResult<Vec<JobStatus>>> {
        self.fan_out(&format!("/api/status/{instance_id}")).await
    }

    pub async fn fetch_system_logs(
        &self,
        level: &str,
        limit: i64,
    ) -> Vec<PeerResult<Vec<SystemLogEntry>>> {
        self.fan_out(&format!("/api/logs/system?level={level}&limit={limit}"))
            .await
    }

    /// Job logs live on exactly one node, so this addresses a single
    /// peer instead of fanning out.
    pub async fn fetch_job_logs(
        &self,
        peer: &str,
        job_id: i64,
        limit: i64,
    ) -> Result<Vec<LogRecord>, PeerError> {
        let peer = peer.trim_end_matches('/');
        self.fetch_one(peer, &format!("/api/logs/job/{job_id}?limit={limit}"))
            .await
    }

    /// Display names for each peer; peers that do not answer keep their
    /// URL as the fallback name.
    pub async fn node_infos(&self) -> HashMap<String, NodeInfo> {
        let results: Vec<PeerResult<NodeInfo>> = self.fan_out("/api/info").await;
        results
            .into_iter()
            .filter_map(|r| match r.result {
                Ok(info) => Some((r.peer, info)),
                Err(_) => None,
            })
            .collect()
    }

    async fn fan_out<T: DeserializeOwned>(&self, path: &str) -> Vec<PeerResult<T>> {
        let requests = self.peers.iter().map(|peer| async {
            PeerResult {
                peer: peer.clone(),
                result: self.fetch_one(peer, path).await,
            }
        });
        join_all(requests).await
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
    ) -> Result<T, PeerError> {
        self.gate.try_begin(peer, Instant::now())?;
        let result = self.request(peer, path).await;
        self.gate.finish(peer, result.is_ok(), Instant::now());
        result
    }

    async fn request<T: DeserializeOwned>(&self, peer: &str, path: &str) -> Result<T, PeerError> {
        let token = self.token_for(peer).await;
        let response = self.send(peer, path, token.as_deref()).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // stale token: drop it and retry once with a fresh one
            self.tokens.write().remove(peer);
            let fresh = self.login(peer).await;
            let response = self.send(peer, path, fresh.as_deref()).await?;
            return Self::decode(response).await;
        }
        Self::decode(response).await
    }

    async fn send(
        &self,
        peer: &str,
        path: &str,
        token: Option<&str>,
    ) -> Result<reqwest::Response, PeerError> {
        let mut request = self
            .http
            .get(format!("{peer}{path}"))
            .timeout(REQUEST_TIMEOUT)
            .header(MESH_HEADER, "true");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| PeerError::Http(e.to_string()))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PeerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))
    }

    async fn token_for(&self, peer: &str) -> Option<String> {
        self.password.as_ref()?;
        if let Some(token) = self.tokens.read().get(peer) {
            return Some(token.clone());
        }
        self.login(peer).await
    }

    /// Mint and cache a bearer token. On any failure returns `None`:
    /// the request goes out without a header and the peer's 401 leaves
    /// it skipped for this round.
    async fn login(&self, peer: &str) -> Option<String> {
        let password = self.password.as_ref()?;

        let _guard = self.login_lock.lock().await;
        // another task may have landed a token while we waited
        if let Some(token) = self.tokens.read().get(peer) {
            return Some(token.clone());
        }

        let response = self
            .http
            .post(format!("{peer}/api/auth/login"))
            .timeout(LOGIN_TIMEOUT)
            .json(&LoginRequest { password })
            .send()
            .await
            .ok()?;
        if response.status() != reqwest::StatusCode::OK {
            return None;
        }
        let body: LoginResponse = response.json().await.ok()?;
        if !body.success {
            return None;
        }
        let token = body.token?;
        self.tokens
            .write()
            .insert(peer.to_string(), token.clone());
        Some(token)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
