// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LIFO cleanup chain
//!
//! Each staging step pushes a callback immediately after acquiring a
//! resource; the job drains the stack at the end or on early failure.
//! Callbacks are expected to be idempotent and tolerant of
//! partially-initialized state, and to log their own failures.

use futures::future::BoxFuture;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
pub struct CleanupStack {
    callbacks: Vec<(String, CleanupFn)>,
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStack")
            .field(
                "callbacks",
                &self.callbacks.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a cleanup step. Later pushes run first.
    pub fn push<F, Fut>(&mut self, label: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.callbacks
            .push((label.into(), Box::new(move || Box::pin(callback()))));
    }

    /// Append another stack's callbacks, preserving their order.
    /// Draining runs the absorbed callbacks before this stack's earlier
    /// entries.
    pub fn absorb(&mut self, other: CleanupStack) {
        self.callbacks.extend(other.callbacks);
    }

    /// Run all callbacks in LIFO order.
    pub async fn drain(&mut self) {
        while let Some((label, callback)) = self.callbacks.pop() {
            tracing::debug!(step = %label, "running cleanup");
            callback().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
