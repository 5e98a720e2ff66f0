// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime adapter data types

use bytes::Bytes;

/// A container as seen by list/inspect.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub id: String,
    /// Primary name, without the leading slash Docker reports.
    pub name: String,
    pub image: String,
    pub running: bool,
    pub mounts: Vec<MountInfo>,
}

impl ContainerInfo {
    /// Whether this container mounts the named volume.
    pub fn mounts_volume(&self, volume: &str) -> bool {
        self.mounts
            .iter()
            .any(|m| m.volume_name.as_deref() == Some(volume))
    }

    /// The mount of the named volume, if present.
    pub fn volume_mount(&self, volume: &str) -> Option<&MountInfo> {
        self.mounts
            .iter()
            .find(|m| m.volume_name.as_deref() == Some(volume))
    }
}

/// One mount point of a container.
///
/// `volume_name` is set for managed volumes and `None` for host binds;
/// that distinction is what `detect_own_mount` relies on.
#[derive(Debug, Clone, Default)]
pub struct MountInfo {
    pub volume_name: Option<String>,
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

/// A named volume.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
}

/// Creation spec for a one-shot container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    /// `host:container[:ro]` bind specs.
    pub binds: Vec<String>,
    pub auto_remove: bool,
}

/// One demultiplexed chunk of container output.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub stderr: bool,
    pub data: Bytes,
}
