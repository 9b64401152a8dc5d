//! Volume plugin error types.
//!
//! Every failure surfaced by the registry, a volume, or the plugin server is a
//! [`VolumeError`].  The `Display` output is what the Docker daemon shows to
//! the user, so mount and unmount failures keep the helper's raw output.

use thiserror::Error;

use crate::profile::Operation;

/// Unified error type for volume plugin operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// A volume with this name is already registered.
    #[error("volume {0:?} already exists")]
    AlreadyExists(String),

    /// Required create options were absent.
    #[error("checking options for {name:?}: missing required options: {missing:?}")]
    InvalidOptions {
        /// Volume the create request was for.
        name: String,
        /// Every required key that was not supplied, in profile order.
        missing: Vec<String>,
    },

    /// The name cannot be used as a directory directly under the root.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidName {
        name: String,
        reason: &'static str,
    },

    /// No volume with this name is registered.
    #[error("volume {0:?} not found")]
    NotFound(String),

    /// Mount was requested for a volume that is already mounted.
    #[error("mount for {0:?} failed: volume is already mounted")]
    AlreadyMounted(String),

    /// Unmount was requested for a volume that is not mounted.
    #[error("unmount for {0:?} failed: volume is not mounted")]
    NotMounted(String),

    /// The mount helper exited unsuccessfully.
    #[error("mount for {name:?} failed: mount helper failed. output:\n{output}")]
    MountFailed {
        /// Volume being mounted.
        name: String,
        /// Captured helper output.
        output: String,
    },

    /// The unmount helper exited unsuccessfully.
    #[error("unmount for {name:?} failed: unmount helper failed on {path:?}. output:\n{output}")]
    UnmountFailed {
        /// Volume being unmounted.
        name: String,
        /// Mount path the helper was pointed at.
        path: String,
        /// Captured helper output.
        output: String,
    },

    /// Creating or deleting a volume directory failed.
    #[error("filesystem error at {path:?}: {reason}")]
    Io {
        /// Path that was being created or removed.
        path: String,
        /// Underlying I/O error text.
        reason: String,
    },

    /// The operation is disabled in the configured profile.
    #[error("{0} is not implemented by this driver profile")]
    NotImplemented(Operation),
}

impl VolumeError {
    /// Create a [`VolumeError::Io`] for `path` from any displayable error.
    pub fn io<P: AsRef<std::path::Path>, E: std::fmt::Display>(path: P, e: E) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        }
    }
}
