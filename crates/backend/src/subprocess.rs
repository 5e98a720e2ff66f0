// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use crate::BackendError;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`. The child is
/// killed automatically when the timeout elapses (tokio `Child` drop).
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
) -> Result<Output, BackendError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(BackendError::Io(io_err)),
        Err(_elapsed) => Err(BackendError::Timeout(timeout)),
    }
}

/// Stdout and stderr concatenated, lossily decoded.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}
