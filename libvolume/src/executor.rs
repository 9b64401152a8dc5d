//! Mount executor: the boundary to the external FUSE helpers.
//!
//! [`MountExecutor`] is the capability the volume state machine calls to
//! attach and detach storage.  [`FuseExecutor`] implements it by running
//! `gcsfuse` in daemon mode and `fusermount -u`; tests substitute their own
//! implementation so no helper binary has to be installed.
//!
//! A zero exit status is the only success signal.  There is no retry, and
//! unless a timeout is configured a hung helper blocks the caller.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::types::MountSpec;

/// Output of a failed helper invocation, kept verbatim for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub output: String,
}

impl Diagnostic {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output)
    }
}

/// Synchronous (awaited to completion) mount and unmount primitives.
#[async_trait]
pub trait MountExecutor: Send + Sync {
    /// Mount `spec.bucket` at `spec.target`.  Returns once the helper exits.
    async fn mount(&self, spec: &MountSpec) -> Result<(), Diagnostic>;

    /// Unmount whatever is mounted at `target`.
    async fn unmount(&self, target: &Path) -> Result<(), Diagnostic>;
}

/// Runs the real `gcsfuse` / `fusermount` binaries.
#[derive(Debug, Clone)]
pub struct FuseExecutor {
    mount_program: PathBuf,
    unmount_program: PathBuf,
    timeout: Option<Duration>,
}

impl FuseExecutor {
    /// Executor using `gcsfuse` and `fusermount` from `PATH`, without a timeout.
    pub fn new() -> Self {
        Self {
            mount_program: PathBuf::from("gcsfuse"),
            unmount_program: PathBuf::from("fusermount"),
            timeout: None,
        }
    }

    /// Override the mount helper binary.
    pub fn with_mount_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.mount_program = program.into();
        self
    }

    /// Override the unmount helper binary.
    pub fn with_unmount_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.unmount_program = program.into();
        self
    }

    /// Kill a helper that has not exited after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to the mount helper for `spec`.
    ///
    /// `gcsfuse` is run without `--foreground`, so it daemonizes and exits
    /// once the mount is live.
    pub fn mount_args(spec: &MountSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o=allow_other".into()];
        if let Some(key_file) = &spec.key_file {
            args.push("--key-file".into());
            args.push(key_file.into());
        }
        if let Some(dir) = &spec.only_dir {
            args.push("--only-dir".into());
            args.push(dir.into());
        }
        args.push(spec.bucket.clone().into());
        args.push(spec.target.clone().into());
        args
    }

    /// Arguments passed to the unmount helper for `target`.
    pub fn unmount_args(target: &Path) -> Vec<OsString> {
        vec!["-u".into(), target.into()]
    }

    async fn run(&self, program: &Path, args: Vec<OsString>) -> Result<(), Diagnostic> {
        let mut cmd = Command::new(program);
        cmd.args(&args).kill_on_drop(true);
        debug!(?cmd, "running helper");

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(program = %program.display(), ?limit, "helper timed out, killing it");
                    return Err(Diagnostic::new(format!(
                        "{} timed out after {}s",
                        program.display(),
                        limit.as_secs_f64()
                    )));
                }
            },
            None => cmd.output().await,
        };

        let output = output.map_err(|e| {
            Diagnostic::new(format!("failed to run {}: {e}", program.display()))
        })?;

        if output.status.success() {
            Ok(())
        } else {
            debug!(program = %program.display(), status = %output.status, "helper failed");
            Err(Diagnostic::new(combined_output(&output)))
        }
    }
}

impl Default for FuseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout followed by stderr.  tokio captures the two streams separately, so
/// the original interleaving is not preserved.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[async_trait]
impl MountExecutor for FuseExecutor {
    #[instrument(skip_all, fields(bucket = %spec.bucket, target = %spec.target.display()))]
    async fn mount(&self, spec: &MountSpec) -> Result<(), Diagnostic> {
        self.run(&self.mount_program, Self::mount_args(spec)).await
    }

    #[instrument(skip_all, fields(target = %target.display()))]
    async fn unmount(&self, target: &Path) -> Result<(), Diagnostic> {
        self.run(&self.unmount_program, Self::unmount_args(target))
            .await
    }
}
