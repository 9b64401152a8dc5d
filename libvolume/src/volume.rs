//! A single named volume and its mount lifecycle.
//!
//! The mount state only moves `unmounted -> mounted` on a successful
//! [`Volume::mount`] and back on a successful [`Volume::unmount`].  Anything
//! else is rejected without calling the executor.  The volume's own lock is
//! held across the helper invocation, so two calls against the same mount
//! path never overlap while calls on other volumes proceed freely.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::error::VolumeError;
use crate::executor::MountExecutor;
use crate::types::{MountSpec, VolumeInfo};

/// Reject names that would not resolve to a directory directly under the
/// volume root.  `Path::join` replaces the base for absolute names, and `.`,
/// `..` or an empty name point at the root or its parent.
pub fn check_name(name: &str) -> Result<(), VolumeError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name == "." || name == ".." {
        "name is a relative path component"
    } else if name.contains('/') {
        "name contains a path separator"
    } else if name.contains('\0') {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(VolumeError::InvalidName {
        name: name.to_owned(),
        reason,
    })
}

/// A registered volume.
#[derive(Debug)]
pub struct Volume {
    name: String,
    /// Bucket to mount.
    bucket: String,
    /// Directory within the bucket to use as the root.
    subdir: Option<String>,
    /// Path at which to mount.
    host_path: PathBuf,
    /// True while the bucket is mounted at `host_path`.
    mounted: Mutex<bool>,
}

impl Volume {
    /// Describe a new, unmounted volume living at `root/name`.
    pub fn new(root: &Path, name: &str, bucket: String, subdir: Option<String>) -> Self {
        Self {
            name: name.to_owned(),
            bucket,
            subdir,
            host_path: root.join(name),
            mounted: Mutex::new(false),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn subdir(&self) -> Option<&str> {
        self.subdir.as_deref()
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            name: self.name.clone(),
            mountpoint: self.host_path.clone(),
        }
    }

    /// Current mount state.  Waits for any in-flight mount or unmount.
    pub async fn is_mounted(&self) -> bool {
        *self.mounted.lock().await
    }

    /// Mount the bucket at the volume's host path.
    #[instrument(skip_all, fields(volume = %self.name))]
    pub async fn mount(
        &self,
        executor: &dyn MountExecutor,
        key_file: Option<&Path>,
    ) -> Result<(), VolumeError> {
        let mut mounted = self.mounted.lock().await;
        if *mounted {
            return Err(VolumeError::AlreadyMounted(self.name.clone()));
        }

        let spec = MountSpec {
            bucket: self.bucket.clone(),
            only_dir: self.subdir.clone(),
            key_file: key_file.map(Path::to_path_buf),
            target: self.host_path.clone(),
        };
        executor
            .mount(&spec)
            .await
            .map_err(|diag| VolumeError::MountFailed {
                name: self.name.clone(),
                output: diag.output,
            })?;

        *mounted = true;
        info!(bucket = %self.bucket, path = %self.host_path.display(), "volume mounted");
        Ok(())
    }

    /// Unmount the volume's host path.
    #[instrument(skip_all, fields(volume = %self.name))]
    pub async fn unmount(&self, executor: &dyn MountExecutor) -> Result<(), VolumeError> {
        let mut mounted = self.mounted.lock().await;
        if !*mounted {
            return Err(VolumeError::NotMounted(self.name.clone()));
        }

        executor
            .unmount(&self.host_path)
            .await
            .map_err(|diag| VolumeError::UnmountFailed {
                name: self.name.clone(),
                path: self.host_path.display().to_string(),
                output: diag.output,
            })?;

        *mounted = false;
        info!(path = %self.host_path.display(), "volume unmounted");
        Ok(())
    }
}
