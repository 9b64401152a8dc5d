//! Core types shared by the registry, the executor and the plugin server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name and mount point of a registered volume, copied out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: PathBuf,
}

/// Everything the mount helper needs to attach one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Bucket to mount.
    pub bucket: String,
    /// Directory within the bucket to expose as the mount root.
    pub only_dir: Option<String>,
    /// Service-account credentials handed to the helper.
    pub key_file: Option<PathBuf>,
    /// Local path the bucket is mounted at.
    pub target: PathBuf,
}

/// Scope advertised to the Docker daemon.
///
/// Buckets are reachable from every host, so the plugin only ever reports
/// `Global` and Docker does not recreate volumes per host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
}

/// Driver capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "Scope")]
    pub scope: Scope,
}
