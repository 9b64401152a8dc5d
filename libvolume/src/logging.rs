//! Entry/exit logging around any [`VolumeDriver`].
//!
//! [`Logging`] forwards every call unchanged.  Entry is logged at `debug`;
//! exit is logged at `debug` on success and `error` on failure.  The exit
//! record comes from a drop guard, so a call that panics or whose future is
//! dropped part-way still leaves an `error` line behind.
//!
//! This keeps noisy bookkeeping out of the registry itself; the registry
//! still logs its own state changes.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::driver::VolumeDriver;
use crate::error::VolumeError;
use crate::types::{Capabilities, VolumeInfo};

/// Logs the outcome of one driver call when dropped.
struct CallLog {
    op: &'static str,
    outcome: Option<Result<String, String>>,
}

impl CallLog {
    fn enter(op: &'static str, request: impl Debug) -> Self {
        debug!("{op}() called: {request:?}");
        Self { op, outcome: None }
    }

    /// Record `res` for the exit log and pass it through untouched.
    fn finish<T: Debug>(mut self, res: Result<T, VolumeError>) -> Result<T, VolumeError> {
        self.outcome = Some(match &res {
            Ok(value) => Ok(format!("{value:?}")),
            Err(e) => Err(e.to_string()),
        });
        res
    }
}

impl Drop for CallLog {
    fn drop(&mut self) {
        let op = self.op;
        match self.outcome.take() {
            Some(Ok(value)) => debug!("{op}() success: {value}"),
            Some(Err(e)) => error!("{op}() failed: {e}"),
            None => error!("{op}() did not complete"),
        }
    }
}

/// A [`VolumeDriver`] that logs on the way in and out of `inner`.
#[derive(Clone)]
pub struct Logging {
    inner: Arc<dyn VolumeDriver>,
}

impl Logging {
    pub fn new(inner: Arc<dyn VolumeDriver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VolumeDriver for Logging {
    async fn create(
        &self,
        name: &str,
        options: HashMap<String, String>,
    ) -> Result<(), VolumeError> {
        let log = CallLog::enter("Create", (name, &options));
        log.finish(self.inner.create(name, options).await)
    }

    async fn get(&self, name: &str) -> Result<VolumeInfo, VolumeError> {
        let log = CallLog::enter("Get", name);
        log.finish(self.inner.get(name).await)
    }

    async fn list(&self) -> Result<Vec<VolumeInfo>, VolumeError> {
        let log = CallLog::enter("List", ());
        log.finish(self.inner.list().await)
    }

    async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let log = CallLog::enter("Remove", name);
        log.finish(self.inner.remove(name).await)
    }

    async fn path(&self, name: &str) -> Result<PathBuf, VolumeError> {
        let log = CallLog::enter("Path", name);
        log.finish(self.inner.path(name).await)
    }

    async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError> {
        let log = CallLog::enter("Mount", name);
        log.finish(self.inner.mount(name).await)
    }

    async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
        let log = CallLog::enter("Unmount", name);
        log.finish(self.inner.unmount(name).await)
    }

    fn capabilities(&self) -> Capabilities {
        let log = CallLog::enter("Capabilities", ());
        let caps = self.inner.capabilities();
        // Capabilities has no error path; record it as a success.
        log.finish(Ok(caps)).unwrap_or(caps)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::executor::{Diagnostic, MountExecutor};
    use crate::profile::Profile;
    use crate::registry::Registry;
    use crate::types::{MountSpec, Scope};

    struct FailingMounts;

    #[async_trait]
    impl MountExecutor for FailingMounts {
        async fn mount(&self, _spec: &MountSpec) -> Result<(), Diagnostic> {
            Err(Diagnostic::new("permission denied"))
        }

        async fn unmount(&self, _target: &Path) -> Result<(), Diagnostic> {
            Ok(())
        }
    }

    fn wrapped(root: &Path) -> (Logging, Arc<Registry>) {
        let registry = Arc::new(Registry::new(
            root,
            None,
            Profile::full(),
            Arc::new(FailingMounts),
        ));
        (Logging::new(registry.clone()), registry)
    }

    #[tokio::test]
    async fn forwards_results_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let (logging, registry) = wrapped(tmp.path());

        let options = HashMap::from([
            ("bucket".to_owned(), "b".to_owned()),
            ("subdir".to_owned(), "d".to_owned()),
        ]);
        logging.create("v1", options).await.unwrap();

        assert_eq!(logging.get("v1").await, registry.get("v1").await);
        assert_eq!(logging.path("v1").await, registry.path("v1").await);
        assert_eq!(
            logging.list().await.unwrap(),
            registry.list().await.unwrap()
        );
        assert_eq!(logging.capabilities().scope, Scope::Global);
    }

    #[tokio::test]
    async fn forwards_errors_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let (logging, _) = wrapped(tmp.path());

        assert_eq!(
            logging.get("missing").await.unwrap_err(),
            VolumeError::NotFound("missing".into())
        );

        let options = HashMap::from([
            ("bucket".to_owned(), "b".to_owned()),
            ("subdir".to_owned(), "d".to_owned()),
        ]);
        logging.create("v1", options).await.unwrap();
        assert_eq!(
            logging.mount("v1").await.unwrap_err(),
            VolumeError::MountFailed {
                name: "v1".into(),
                output: "permission denied".into(),
            }
        );
        assert_eq!(
            logging.unmount("v1").await.unwrap_err(),
            VolumeError::NotMounted("v1".into())
        );
    }
}
