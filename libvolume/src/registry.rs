//! The volume registry.
//!
//! [`Registry`] maps volume names to [`Volume`]s and implements
//! [`VolumeDriver`] on top of that map.
//!
//! # Locking
//!
//! One async mutex guards the whole map.  Create, Get, List, Remove and Path
//! hold it for their full duration, including directory I/O.  Mount and
//! Unmount hold it only to look the volume up; the lock is released before
//! the helper runs, so a slow mount never stalls unrelated volumes.  The
//! volume's own lock then serializes calls against the same mount path.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   <volume-name>/    # mount point, created on Create, deleted on Remove
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::driver::VolumeDriver;
use crate::error::VolumeError;
use crate::executor::MountExecutor;
use crate::profile::{BUCKET_KEY, Operation, Profile};
use crate::types::{Capabilities, Scope, VolumeInfo};
use crate::volume::{Volume, check_name};

/// Mode of the per-volume mount directory.
const VOLUME_DIR_MODE: u32 = 0o755;

/// In-memory registry of volumes backed by an injectable mount executor.
pub struct Registry {
    /// Directory under which every volume gets its mount point.
    root: PathBuf,
    /// Credentials file passed to the mount helper, if any.
    key_file: Option<PathBuf>,
    profile: Profile,
    executor: Arc<dyn MountExecutor>,
    /// Volumes by unique name.
    volumes: Mutex<HashMap<String, Arc<Volume>>>,
}

impl Registry {
    /// Create an empty registry.
    ///
    /// * `root` — directory holding one mount point per volume
    /// * `key_file` — credentials forwarded to the mount helper
    /// * `profile` — required options and enabled operations
    /// * `executor` — runs the mount and unmount helpers
    pub fn new(
        root: impl Into<PathBuf>,
        key_file: Option<PathBuf>,
        profile: Profile,
        executor: Arc<dyn MountExecutor>,
    ) -> Self {
        Self {
            root: root.into(),
            key_file,
            profile,
            executor,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_enabled(&self, op: Operation) -> Result<(), VolumeError> {
        if self.profile.is_enabled(op) {
            Ok(())
        } else {
            Err(VolumeError::NotImplemented(op))
        }
    }

    /// Every required key absent from `options`, in profile order.
    fn missing_options(&self, options: &HashMap<String, String>) -> Vec<String> {
        self.profile
            .required_keys()
            .into_iter()
            .filter(|key| !options.contains_key(*key))
            .map(str::to_owned)
            .collect()
    }

    /// Look a volume up and hand back a handle that outlives the map lock.
    async fn lookup(&self, name: &str) -> Result<Arc<Volume>, VolumeError> {
        check_name(name)?;
        self.volumes
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(name.to_owned()))
    }
}

async fn create_volume_dir(path: &Path) -> Result<(), VolumeError> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(VOLUME_DIR_MODE)
        .create(path)
        .await
        .map_err(|e| VolumeError::io(path, format!("failed to create local mountpoint: {e}")))
}

async fn remove_volume_dir(path: &Path) -> Result<(), VolumeError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        // Already gone: nothing left to clean up.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VolumeError::io(
            path,
            format!("failed to remove mount path: {e}"),
        )),
    }
}

#[async_trait]
impl VolumeDriver for Registry {
    #[instrument(skip(self, options))]
    async fn create(
        &self,
        name: &str,
        mut options: HashMap<String, String>,
    ) -> Result<(), VolumeError> {
        self.ensure_enabled(Operation::Create)?;
        check_name(name)?;
        let mut volumes = self.volumes.lock().await;

        // Docker calls Get before Create, so a duplicate here means two
        // callers raced on the same name. Names must stay unique.
        if volumes.contains_key(name) {
            return Err(VolumeError::AlreadyExists(name.to_owned()));
        }

        let missing = self.missing_options(&options);
        if !missing.is_empty() {
            return Err(VolumeError::InvalidOptions {
                name: name.to_owned(),
                missing,
            });
        }

        let bucket = options.remove(BUCKET_KEY).unwrap_or_default();
        let subdir = options
            .remove(&self.profile.subdir_key)
            .filter(|dir| !dir.is_empty());
        if !options.is_empty() {
            let ignored: Vec<&String> = options.keys().collect();
            debug!(?ignored, "ignoring unknown create options");
        }

        let volume = Volume::new(&self.root, name, bucket, subdir);

        // Make the mount point first so a failure leaves nothing registered.
        create_volume_dir(volume.host_path()).await?;

        info!(
            bucket = volume.bucket(),
            subdir = volume.subdir(),
            path = %volume.host_path().display(),
            "volume created",
        );
        volumes.insert(name.to_owned(), Arc::new(volume));
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<VolumeInfo, VolumeError> {
        self.ensure_enabled(Operation::Get)?;
        check_name(name)?;
        let volumes = self.volumes.lock().await;
        volumes
            .get(name)
            .map(|vol| vol.info())
            .ok_or_else(|| VolumeError::NotFound(name.to_owned()))
    }

    async fn list(&self) -> Result<Vec<VolumeInfo>, VolumeError> {
        self.ensure_enabled(Operation::List)?;
        let volumes = self.volumes.lock().await;
        Ok(volumes.values().map(|vol| vol.info()).collect())
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        self.ensure_enabled(Operation::Remove)?;
        check_name(name)?;
        let mut volumes = self.volumes.lock().await;

        // After a restart Docker may still ask about volumes this process
        // never saw; clean up the directory they would have used.
        let path = match volumes.get(name) {
            Some(vol) => vol.host_path().to_path_buf(),
            None => {
                warn!(volume = name, "remove called for unknown volume");
                self.root.join(name)
            }
        };

        remove_volume_dir(&path).await?;
        if volumes.remove(name).is_some() {
            info!(path = %path.display(), "volume removed");
        }
        Ok(())
    }

    async fn path(&self, name: &str) -> Result<PathBuf, VolumeError> {
        self.ensure_enabled(Operation::Path)?;
        check_name(name)?;
        let volumes = self.volumes.lock().await;
        volumes
            .get(name)
            .map(|vol| vol.host_path().to_path_buf())
            .ok_or_else(|| VolumeError::NotFound(name.to_owned()))
    }

    async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError> {
        self.ensure_enabled(Operation::Mount)?;
        let volume = self.lookup(name).await?;
        volume
            .mount(self.executor.as_ref(), self.key_file.as_deref())
            .await?;
        Ok(volume.host_path().to_path_buf())
    }

    async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
        self.ensure_enabled(Operation::Unmount)?;
        let volume = self.lookup(name).await?;
        volume.unmount(self.executor.as_ref()).await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: Scope::Global,
        }
    }
}
