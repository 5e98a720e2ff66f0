// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Federation client
//!
//! Read-only aggregation of peer nodes: concurrent fan-out with a
//! per-peer token cache, an in-flight guard, and an exponential-backoff
//! circuit breaker. Every request carries the mesh marker header so
//! peers answer with local data only and the mesh cannot recurse.

mod circuit;
mod client;
mod types;

pub use client::FederationClient;
pub use types::{NodeInfo, PeerResult, SystemLogEntry};

use thiserror::Error;

/// Request marker header identifying peer-to-peer calls.
pub const MESH_HEADER: &str = "x-marina-mesh";

/// Per-peer failure, excluded from merged responses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerError {
    /// Circuit open; suppressed from logs entirely.
    #[error("in backoff")]
    InBackoff,
    /// Another request to this peer is already running.
    #[error("in flight")]
    InFlight,
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl PeerError {
    /// Whether this error should be silenced rather than logged.
    pub fn is_silent(&self) -> bool {
        matches!(self, PeerError::InBackoff)
    }
}
