//! Command-line and environment configuration.
//!
//! Every flag can also be set through a `GCSFUSE_DOCKER_*` environment
//! variable, which is how the plugin is usually configured when it runs as a
//! systemd unit next to the Docker daemon.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use libvolume::{FuseExecutor, OptionProfile, Operation, Profile};

/// Docker volume plugin mounting Google Cloud Storage buckets with gcsfuse.
#[derive(Debug, Parser)]
#[command(name = "gcsfuse-docker", version, about)]
pub struct Cli {
    /// Directory under which each volume gets its mount point.
    #[arg(long, env = "GCSFUSE_DOCKER_ROOT", default_value = "/var/lib/docker-volumes/gcsfuse")]
    pub root: PathBuf,

    /// Service-account JSON key passed to gcsfuse as `--key-file`.
    #[arg(long, env = "GCSFUSE_DOCKER_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Plugin name; the socket is `<socket-dir>/<name>.sock`.
    #[arg(long, env = "GCSFUSE_DOCKER_PLUGIN_NAME", default_value = "gcsfuse")]
    pub plugin_name: String,

    /// Directory the Docker daemon scans for plugin sockets.
    #[arg(long, env = "GCSFUSE_DOCKER_SOCKET_DIR", default_value = "/run/docker/plugins")]
    pub socket_dir: PathBuf,

    /// Group that owns the plugin socket.
    #[arg(long, env = "GCSFUSE_DOCKER_SOCKET_GID")]
    pub socket_gid: Option<u32>,

    /// Base profile: `full` or `minimal`.
    #[arg(long, env = "GCSFUSE_DOCKER_PROFILE", default_value = "full")]
    pub profile: Profile,

    /// Override the required create options: `bucket` or `bucket-subdir`.
    #[arg(long, env = "GCSFUSE_DOCKER_REQUIRED_OPTIONS")]
    pub required_options: Option<OptionProfile>,

    /// Option key naming the directory within the bucket.
    #[arg(long, env = "GCSFUSE_DOCKER_SUBDIR_KEY")]
    pub subdir_key: Option<String>,

    /// Operations to answer with "not implemented" (repeatable).
    #[arg(long = "disable", value_name = "OPERATION", env = "GCSFUSE_DOCKER_DISABLE", value_delimiter = ',')]
    pub disabled: Vec<Operation>,

    /// Mount helper binary.
    #[arg(long, env = "GCSFUSE_DOCKER_MOUNT_PROGRAM", default_value = "gcsfuse")]
    pub mount_program: PathBuf,

    /// Unmount helper binary.
    #[arg(long, env = "GCSFUSE_DOCKER_UNMOUNT_PROGRAM", default_value = "fusermount")]
    pub unmount_program: PathBuf,

    /// Kill a mount/unmount helper that runs longer than this many seconds.
    #[arg(long, env = "GCSFUSE_DOCKER_MOUNT_TIMEOUT")]
    pub mount_timeout: Option<u64>,

    /// Emit JSON log lines instead of human-readable text.
    #[arg(long, env = "GCSFUSE_DOCKER_LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// The driver profile after applying overrides to the base profile.
    pub fn driver_profile(&self) -> Profile {
        let mut profile = self.profile.clone();
        if let Some(options) = self.required_options {
            profile.options = options;
        }
        if let Some(key) = &self.subdir_key {
            profile.subdir_key = key.clone();
        }
        for op in &self.disabled {
            profile.disable(*op);
        }
        profile
    }

    pub fn executor(&self) -> FuseExecutor {
        FuseExecutor::new()
            .with_mount_program(&self.mount_program)
            .with_unmount_program(&self.unmount_program)
            .with_timeout(self.mount_timeout.map(Duration::from_secs))
    }

    pub fn socket_path(&self) -> PathBuf {
        libvolume::transport::socket_path(&self.socket_dir, &self.plugin_name)
    }
}
