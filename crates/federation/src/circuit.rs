// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-peer circuit breaker
//!
//! The failure counter, backoff window, and in-flight flag form one
//! unit and are mutated under one lock; the in-flight test is
//! double-checked against the backoff window inside that lock so an
//! open-circuit stampede cannot produce parallel requests.

use crate::PeerError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Consecutive failures before the circuit opens.
const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct PeerGate {
    failures: u32,
    backoff_until: Option<Instant>,
    in_flight: bool,
}

#[derive(Default)]
pub(crate) struct Gate {
    peers: Mutex<HashMap<String, PeerGate>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the peer for one request, or say why not.
    pub fn try_begin(&self, peer: &str, now: Instant) -> Result<(), PeerError> {
        let mut peers = self.peers.lock();
        let gate = peers.entry(peer.to_string()).or_default();
        if let Some(until) = gate.backoff_until {
            if now < until {
                return Err(PeerError::InBackoff);
            }
        }
        if gate.in_flight {
            return Err(PeerError::InFlight);
        }
        gate.in_flight = true;
        Ok(())
    }

    /// Release the peer and update the breaker.
    pub fn finish(&self, peer: &str, success: bool, now: Instant) {
        let mut peers = self.peers.lock();
        let gate = peers.entry(peer.to_string()).or_default();
        gate.in_flight = false;
        if success {
            gate.failures = 0;
            gate.backoff_until = None;
        } else {
            gate.failures += 1;
            if let Some(backoff) = backoff_for(gate.failures) {
                gate.backoff_until = Some(now + backoff);
            }
        }
    }

    #[cfg(test)]
    pub fn failures(&self, peer: &str) -> u32 {
        self.peers
            .lock()
            .get(peer)
            .map(|g| g.failures)
            .unwrap_or(0)
    }
}

/// Backoff window for a failure count: 30s at the threshold, doubling
/// twice, capped at 300s.
fn backoff_for(failures: u32) -> Option<Duration> {
    let secs = match failures {
        0..=2 => return None,
        3 => 30,
        4 => 60,
        5 => 120,
        _ => 300,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
