//! The volume driver RPC vocabulary.
//!
//! Both the [`Registry`](crate::registry::Registry) and the
//! [`Logging`](crate::logging::Logging) wrapper implement this trait, and the
//! plugin server dispatches to whatever `VolumeDriver` it was given.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::VolumeError;
use crate::types::{Capabilities, VolumeInfo};

/// Operations the Docker daemon invokes on a volume plugin.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Register a new volume from its create options.
    async fn create(&self, name: &str, options: HashMap<String, String>)
    -> Result<(), VolumeError>;

    /// Look up a single volume.
    async fn get(&self, name: &str) -> Result<VolumeInfo, VolumeError>;

    /// Every registered volume, in no particular order.
    async fn list(&self) -> Result<Vec<VolumeInfo>, VolumeError>;

    /// Forget a volume and delete its mount directory.
    async fn remove(&self, name: &str) -> Result<(), VolumeError>;

    /// Where the volume is (or would be) mounted.
    async fn path(&self, name: &str) -> Result<PathBuf, VolumeError>;

    /// Mount the volume and return its mount point.
    async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError>;

    async fn unmount(&self, name: &str) -> Result<(), VolumeError>;

    fn capabilities(&self) -> Capabilities;
}
