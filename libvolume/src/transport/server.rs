//! Unix-socket server speaking the Docker volume plugin protocol.
//!
//! The daemon discovers the plugin by the socket's file name under
//! `/run/docker/plugins` and issues one HTTP POST per call.  Each accepted
//! connection is served by hyper on its own Tokio task, and every request is
//! decoded and dispatched to the wrapped [`VolumeDriver`].

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, StatusCode};
use serde::de::DeserializeOwned;
use tokio::net::UnixListener;
use tracing::{debug, error, info, instrument, warn};

use crate::driver::VolumeDriver;
use crate::message::{CreateRequest, MountRequest, NameRequest, PLUGIN_CONTENT_TYPE, Response};

/// Socket file permissions: owner and group may connect.
const SOCKET_MODE: u32 = 0o660;

/// Largest request body accepted from a client.
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Path of the socket for plugin `name` inside `dir`.
pub fn socket_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.sock"))
}

/// A plugin server bound to a Unix socket, dispatching to `T`.
pub struct PluginServer<T> {
    listener: UnixListener,
    socket_path: PathBuf,
    handler: Arc<T>,
}

impl<T> PluginServer<T>
where
    T: VolumeDriver + 'static,
{
    /// Bind the plugin socket at `socket_path`.
    ///
    /// A stale socket left by a previous run is removed first.  The socket is
    /// made group-accessible and, when `gid` is given, handed to that group.
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        socket_path: impl Into<PathBuf>,
        gid: Option<u32>,
        handler: Arc<T>,
    ) -> io::Result<Self> {
        let socket_path = socket_path.into();
        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale plugin socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(&socket_path)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
        if let Some(gid) = gid {
            nix::unistd::chown(
                &socket_path,
                None,
                Some(nix::unistd::Gid::from_raw(gid)),
            )
            .map_err(io::Error::from)?;
        }

        info!(path = %socket_path.display(), "plugin server listening");
        Ok(Self {
            listener,
            socket_path,
            handler,
        })
    }

    /// Accept connections until `shutdown` resolves, then remove the socket.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "failed to accept plugin connection");
                            continue;
                        }
                    };
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let handler = Arc::clone(&handler);
                            async move { Ok::<_, Infallible>(handle_request(handler.as_ref(), req).await) }
                        });
                        if let Err(e) = Http::new().serve_connection(stream, service).await {
                            debug!(error = %e, "plugin connection closed with error");
                        }
                    });
                }
            }
        }

        info!(path = %self.socket_path.display(), "plugin server shutting down");
        match std::fs::remove_file(&self.socket_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

async fn handle_request<T: VolumeDriver + ?Sized>(
    handler: &T,
    req: Request<Body>,
) -> hyper::Response<Body> {
    let path = req.uri().path().to_owned();
    let (status, body) = match read_body(req.into_body(), MAX_BODY_SIZE).await {
        Ok(bytes) => dispatch(handler, &path, &bytes).await,
        Err(reply) => reply,
    };

    let (status, payload) = match serde_json::to_vec(&body) {
        Ok(payload) => (status, payload),
        Err(e) => {
            error!(error = %e, "failed to encode plugin response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"Err":"failed to encode response"}"#.to_vec(),
            )
        }
    };

    let mut resp = hyper::Response::new(Body::from(payload));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PLUGIN_CONTENT_TYPE),
    );
    resp
}

/// Collect a request body of at most `limit` bytes.
///
/// A declared `Content-Length` over the limit is refused before anything is
/// read; chunked bodies are cut off once they grow past it.
async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, (StatusCode, Response)> {
    let too_large = || {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            Response::error(format!("request body exceeds {limit} bytes")),
        )
    };
    if body.size_hint().lower() > limit as u64 {
        return Err(too_large());
    }

    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Response::error(format!("reading request body: {e}")),
            )
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Decode a request body.  Docker sends an empty body for List and
/// Capabilities, which decodes to the default request.
fn parse<R: DeserializeOwned + Default>(body: &[u8]) -> Result<R, (StatusCode, Response)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(R::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Response::error(format!("malformed request: {e}")),
        )
    })
}

/// Map one plugin call to the matching driver method.
///
/// Driver failures become `500` with the error text in `Err`, which the
/// daemon shows to the user verbatim.
#[instrument(skip(handler, body))]
pub async fn dispatch<T: VolumeDriver + ?Sized>(
    handler: &T,
    path: &str,
    body: &[u8],
) -> (StatusCode, Response) {
    let result = match path {
        "/Plugin.Activate" => Ok(Response::activate()),

        "/VolumeDriver.Create" => match parse::<CreateRequest>(body) {
            Ok(req) => handler
                .create(&req.name, req.options)
                .await
                .map(|()| Response::default()),
            Err(reply) => return reply,
        },
        "/VolumeDriver.Get" => match parse::<NameRequest>(body) {
            Ok(req) => handler.get(&req.name).await.map(Response::volume),
            Err(reply) => return reply,
        },
        "/VolumeDriver.List" => handler.list().await.map(Response::volumes),
        "/VolumeDriver.Remove" => match parse::<NameRequest>(body) {
            Ok(req) => handler
                .remove(&req.name)
                .await
                .map(|()| Response::default()),
            Err(reply) => return reply,
        },
        "/VolumeDriver.Path" => match parse::<NameRequest>(body) {
            Ok(req) => handler.path(&req.name).await.map(Response::mountpoint),
            Err(reply) => return reply,
        },
        "/VolumeDriver.Mount" => match parse::<MountRequest>(body) {
            Ok(req) => {
                debug!(volume = %req.name, id = %req.id, "mount requested");
                handler.mount(&req.name).await.map(Response::mountpoint)
            }
            Err(reply) => return reply,
        },
        "/VolumeDriver.Unmount" => match parse::<MountRequest>(body) {
            Ok(req) => {
                debug!(volume = %req.name, id = %req.id, "unmount requested");
                handler
                    .unmount(&req.name)
                    .await
                    .map(|()| Response::default())
            }
            Err(reply) => return reply,
        },
        "/VolumeDriver.Capabilities" => Ok(Response::capabilities(handler.capabilities())),

        other => {
            warn!(path = other, "unknown plugin endpoint");
            return (
                StatusCode::NOT_FOUND,
                Response::error(format!("unknown plugin endpoint {other}")),
            );
        }
    };

    match result {
        Ok(resp) => (StatusCode::OK, resp),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Response::error(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;
    use crate::error::VolumeError;
    use crate::types::{Capabilities, Scope, VolumeInfo};

    /// Answers every call from fixed data.
    struct Canned;

    #[async_trait]
    impl VolumeDriver for Canned {
        async fn create(
            &self,
            name: &str,
            options: HashMap<String, String>,
        ) -> Result<(), VolumeError> {
            if options.contains_key("bucket") {
                Ok(())
            } else {
                Err(VolumeError::InvalidOptions {
                    name: name.to_owned(),
                    missing: vec!["bucket".into()],
                })
            }
        }

        async fn get(&self, name: &str) -> Result<VolumeInfo, VolumeError> {
            Ok(VolumeInfo {
                name: name.to_owned(),
                mountpoint: PathBuf::from("/mnt").join(name),
            })
        }

        async fn list(&self) -> Result<Vec<VolumeInfo>, VolumeError> {
            Ok(vec![])
        }

        async fn remove(&self, _name: &str) -> Result<(), VolumeError> {
            Ok(())
        }

        async fn path(&self, name: &str) -> Result<PathBuf, VolumeError> {
            Err(VolumeError::NotFound(name.to_owned()))
        }

        async fn mount(&self, name: &str) -> Result<PathBuf, VolumeError> {
            Ok(PathBuf::from("/mnt").join(name))
        }

        async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
            Err(VolumeError::NotMounted(name.to_owned()))
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                scope: Scope::Global,
            }
        }
    }

    #[tokio::test]
    async fn activate_advertises_volume_driver() {
        let (status, resp) = dispatch(&Canned, "/Plugin.Activate", b"").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp, Response::activate());
    }

    #[tokio::test]
    async fn create_error_is_reported_in_err() {
        let (status, resp) =
            dispatch(&Canned, "/VolumeDriver.Create", br#"{"Name":"v1","Opts":{}}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.err.contains("bucket"));
    }

    #[tokio::test]
    async fn mount_returns_mountpoint() {
        let (status, resp) = dispatch(
            &Canned,
            "/VolumeDriver.Mount",
            br#"{"Name":"v1","ID":"abc123"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.mountpoint, Some(PathBuf::from("/mnt/v1")));
        assert!(resp.err.is_empty());
    }

    #[tokio::test]
    async fn empty_list_body_is_accepted() {
        let (status, resp) = dispatch(&Canned, "/VolumeDriver.List", b"").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.volumes, Some(vec![]));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (status, resp) = dispatch(&Canned, "/VolumeDriver.Get", b"{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp.err.starts_with("malformed request"));
    }

    #[tokio::test]
    async fn unknown_endpoint_is_not_found() {
        let (status, _) = dispatch(&Canned, "/VolumeDriver.Snapshot", b"{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let req = Request::builder()
            .method("POST")
            .uri("/VolumeDriver.Create")
            .body(Body::from(vec![b' '; MAX_BODY_SIZE + 1]))
            .unwrap();
        let resp = handle_request(&Canned, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let body: Response = serde_json::from_slice(&bytes).unwrap();
        assert!(body.err.contains("exceeds"));
    }

    #[tokio::test]
    async fn chunked_body_is_cut_off_at_limit() {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            for _ in 0..4 {
                if tx.send_data(hyper::body::Bytes::from_static(b"0123456789")).await.is_err() {
                    break;
                }
            }
        });
        let (status, resp) = read_body(body, 25).await.unwrap_err();
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!resp.err.is_empty());
    }

    #[tokio::test]
    async fn body_within_limit_is_read_whole() {
        let bytes = read_body(Body::from(r#"{"Name":"v1"}"#), 64).await.unwrap();
        assert_eq!(bytes, br#"{"Name":"v1"}"#);
    }

    #[tokio::test]
    async fn capabilities_scope_is_global() {
        let (_, resp) = dispatch(&Canned, "/VolumeDriver.Capabilities", b"{}").await;
        assert_eq!(
            resp.capabilities,
            Some(Capabilities {
                scope: Scope::Global
            })
        );
    }
}
