// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom-image backend
//!
//! Runs a one-shot container from the configured image with the
//! instance's staging directory bind-mounted at `/backup`. Container
//! output is forwarded line by line to the job logger at DEBUG and
//! accumulated into a transcript, which becomes the error payload on a
//! nonzero exit.

use crate::BackendError;
use futures::StreamExt;
use marina_core::InstanceId;
use marina_runtime::{ContainerRuntime, ContainerSpec};
use marina_store::JobLogger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Bound on draining the log stream after the container exited.
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct CustomImageBackend {
    image: String,
    instance_id: InstanceId,
    hostname: String,
    host_backup_path: PathBuf,
    env: Vec<(String, String)>,
    timeout: Duration,
    runtime: Arc<dyn ContainerRuntime>,
    logger: Option<JobLogger>,
}

impl CustomImageBackend {
    pub fn new(
        image: String,
        instance_id: InstanceId,
        hostname: String,
        host_backup_path: PathBuf,
        env: Vec<(String, String)>,
        timeout: Duration,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            image,
            instance_id,
            hostname,
            host_backup_path,
            env,
            timeout,
            runtime,
            logger: None,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_logger(&mut self, logger: JobLogger) {
        self.logger = Some(logger);
    }

    /// Pull the image; on pull failure fall back to a locally present
    /// copy if there is one.
    pub async fn init(&self) -> Result<(), BackendError> {
        match self.runtime.pull_image(&self.image).await {
            Ok(()) => Ok(()),
            Err(pull_err) => {
                if self.runtime.image_present(&self.image).await? {
                    tracing::debug!(
                        image = %self.image,
                        error = %pull_err,
                        "pull failed, using local image"
                    );
                    Ok(())
                } else {
                    Err(BackendError::Init(pull_err.to_string()))
                }
            }
        }
    }

    pub async fn backup(&self) -> Result<String, BackendError> {
        let name = format!(
            "marina-backup-{}-{}",
            self.instance_id,
            uuid::Uuid::new_v4().simple()
        );
        let mut env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.push(format!("MARINA_INSTANCE_ID={}", self.instance_id));
        env.push(format!("MARINA_HOSTNAME={}", self.hostname));

        let spec = ContainerSpec {
            name,
            image: self.image.clone(),
            cmd: vec!["/backup.sh".to_string()],
            env,
            binds: vec![format!(
                "{}/{}:/backup",
                self.host_backup_path.display(),
                self.instance_id
            )],
            auto_remove: true,
        };

        let id = self.runtime.create_container(spec).await?;
        let result = self.run_and_collect(&id).await;
        // AutoRemove usually did this already; errors are expected noise
        let _ = self.runtime.remove_container(&id).await;
        result
    }

    async fn run_and_collect(&self, id: &str) -> Result<String, BackendError> {
        // attach before start so early output is not lost
        let mut stream = self.runtime.follow_logs(id);
        let logger = self.logger.clone();
        let transcript = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&transcript);
        let log_task = tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk.data));
                while let Some(line) = drain_line(&mut buffer) {
                    forward(&logger, &sink, &line).await;
                }
            }
            if !buffer.is_empty() {
                forward(&logger, &sink, &buffer).await;
            }
        });

        self.runtime.start_container(id).await?;

        let exit_code =
            match tokio::time::timeout(self.timeout, self.runtime.wait_container(id)).await {
                Ok(result) => result?,
                Err(_) => {
                    log_task.abort();
                    return Err(BackendError::Timeout(self.timeout));
                }
            };

        // the stream ends when the container exits; bound the drain anyway
        let _ = tokio::time::timeout(LOG_DRAIN_TIMEOUT, log_task).await;

        let transcript = transcript.lock().await.clone();
        if exit_code == 0 {
            Ok(transcript)
        } else {
            Err(BackendError::Backup(format!(
                "backup container exited with status {exit_code}:\n{transcript}"
            )))
        }
    }
}

async fn forward(logger: &Option<JobLogger>, transcript: &Arc<Mutex<String>>, line: &str) {
    if let Some(logger) = logger {
        logger.debug(line.to_string()).await;
    }
    let mut t = transcript.lock().await;
    t.push_str(line);
    t.push('\n');
}

/// Remove and return the first complete newline-terminated line.
fn drain_line(buffer: &mut String) -> Option<String> {
    let pos = buffer.find('\n')?;
    let line = buffer[..pos].trim_end_matches('\r').to_string();
    buffer.drain(..=pos);
    Some(line)
}

#[cfg(test)]
#[path = "custom_image_tests.rs"]
mod tests;
