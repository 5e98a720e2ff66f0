// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time view of the container runtime
//!
//! The schedule builder is pure; this is the only piece that talks to
//! the runtime, and it only looks up what the configuration names.

use marina_config::{Config, TargetConfig};
use marina_runtime::{ContainerInfo, ContainerRuntime};
use std::collections::HashSet;
use std::sync::Arc;

/// Containers and volumes that existed when the snapshot was taken.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    pub containers: Vec<ContainerInfo>,
    pub volumes: HashSet<String>,
}

impl RuntimeSnapshot {
    /// Collect a snapshot covering the volumes and containers the
    /// configuration declares. Lookup failures leave the entry out, so
    /// the builder reports it as unresolved.
    pub async fn collect(runtime: &Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        let containers = runtime.list_containers().await.unwrap_or_default();

        let mut volumes = HashSet::new();
        for instance in &config.instances {
            for target in &instance.targets {
                if let TargetConfig::Volume { name, .. } = target {
                    if volumes.contains(name) {
                        continue;
                    }
                    if runtime.inspect_volume(name).await.is_ok() {
                        volumes.insert(name.clone());
                    }
                }
            }
        }

        Self { containers, volumes }
    }

    pub fn container_by_name(&self, name: &str) -> Option<&ContainerInfo> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.contains(name)
    }
}
