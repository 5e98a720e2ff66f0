// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator auth
//!
//! Password login mints an opaque bearer token held in an in-memory
//! allow-list; protected requests accept it via cookie or
//! `Authorization: Bearer`. An empty password disables auth entirely.

use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "marina_token";
const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of a login attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Auth is disabled; no token needed.
    Disabled,
    /// Password matched; a fresh token was minted.
    Token(String),
    Rejected,
}

pub struct AuthState {
    password: Option<String>,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl AuthState {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password: password.filter(|p| !p.is_empty()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Whether requests must present a token.
    pub fn required(&self) -> bool {
        self.password.is_some()
    }

    /// Verify the password; on match mint a token valid for 24 hours.
    /// With auth disabled every login succeeds without minting.
    pub fn login(&self, password: &str) -> LoginOutcome {
        let Some(expected) = &self.password else {
            return LoginOutcome::Disabled;
        };
        if password != expected {
            return LoginOutcome::Rejected;
        }
        let token = mint_token();
        self.tokens
            .lock()
            .insert(token.clone(), Instant::now() + TOKEN_TTL);
        LoginOutcome::Token(token)
    }

    pub fn invalidate(&self, token: &str) {
        self.tokens.lock().remove(token);
    }

    /// Whether a presented token is live. Expired entries are dropped
    /// as they are seen.
    pub fn is_valid(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.get(token) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                tokens.remove(token);
                false
            }
            None => false,
        }
    }
}

fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
