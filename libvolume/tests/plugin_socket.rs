//! End-to-end plugin calls over a real Unix socket.
//!
//! Requests are written as raw HTTP/1.1 with `Connection: close`, the way the
//! Docker daemon's plugin client talks to the socket.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use libvolume::message::Response;
use libvolume::transport::socket_path;
use libvolume::{Diagnostic, Logging, MountExecutor, MountSpec, PluginServer, Profile, Registry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;

#[derive(Default)]
struct FakeFuse {
    mounts: AtomicUsize,
}

#[async_trait]
impl MountExecutor for FakeFuse {
    async fn mount(&self, spec: &MountSpec) -> Result<(), Diagnostic> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        if spec.bucket == "forbidden" {
            Err(Diagnostic::new("googleapi: Error 403: Forbidden"))
        } else {
            Ok(())
        }
    }

    async fn unmount(&self, _target: &Path) -> Result<(), Diagnostic> {
        Ok(())
    }
}

async fn call(socket: &Path, endpoint: &str, body: &str) -> (u16, Response) {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    let request = format!(
        "POST {endpoint} HTTP/1.1\r\nHost: plugin\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let status: u16 = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let (_, payload) = raw.split_once("\r\n\r\n").unwrap();
    (status, serde_json::from_str(payload).unwrap())
}

#[tokio::test]
async fn docker_volume_lifecycle_over_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("volumes");
    let socket = socket_path(&tmp.path().join("plugins"), "gcsfuse");

    let exec = Arc::new(FakeFuse::default());
    let registry = Arc::new(Registry::new(&root, None, Profile::full(), exec.clone()));
    let driver = Arc::new(Logging::new(registry));
    let server = PluginServer::bind(&socket, None, driver).unwrap();
    assert!(socket.exists());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async {
        let _ = stop_rx.await;
    }));

    let (status, resp) = call(&socket, "/Plugin.Activate", "").await;
    assert_eq!(status, 200);
    assert_eq!(resp.implements, Some(vec!["VolumeDriver".to_owned()]));

    // Missing options are reported together.
    let (status, resp) = call(&socket, "/VolumeDriver.Create", r#"{"Name":"data","Opts":{}}"#).await;
    assert_eq!(status, 500);
    assert!(resp.err.contains("bucket") && resp.err.contains("subdir"));

    let (status, resp) = call(
        &socket,
        "/VolumeDriver.Create",
        r#"{"Name":"data","Opts":{"bucket":"my-bucket","subdir":"team"}}"#,
    )
    .await;
    assert_eq!((status, resp.err.as_str()), (200, ""));
    assert!(root.join("data").is_dir());

    let (_, resp) = call(&socket, "/VolumeDriver.Get", r#"{"Name":"data"}"#).await;
    let volume = resp.volume.unwrap();
    assert_eq!(volume.name, "data");
    assert_eq!(volume.mountpoint, root.join("data"));

    let (status, resp) = call(
        &socket,
        "/VolumeDriver.Mount",
        r#"{"Name":"data","ID":"c0ffee"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(resp.mountpoint, Some(root.join("data")));

    let (status, resp) = call(
        &socket,
        "/VolumeDriver.Mount",
        r#"{"Name":"data","ID":"beef"}"#,
    )
    .await;
    assert_eq!(status, 500);
    assert!(resp.err.contains("already mounted"));
    assert_eq!(exec.mounts.load(Ordering::SeqCst), 1);

    let (status, _) = call(&socket, "/VolumeDriver.Unmount", r#"{"Name":"data","ID":"c0ffee"}"#).await;
    assert_eq!(status, 200);

    let (_, resp) = call(&socket, "/VolumeDriver.List", "{}").await;
    assert_eq!(resp.volumes.map(|v| v.len()), Some(1));

    let (_, resp) = call(&socket, "/VolumeDriver.Capabilities", "").await;
    assert_eq!(
        serde_json::to_value(resp.capabilities.unwrap()).unwrap(),
        serde_json::json!({"Scope": "global"})
    );

    let (status, _) = call(&socket, "/VolumeDriver.Remove", r#"{"Name":"data"}"#).await;
    assert_eq!(status, 200);
    assert!(!root.join("data").exists());

    // Unknown names still succeed so Docker can clean up after a restart.
    let (status, _) = call(&socket, "/VolumeDriver.Remove", r#"{"Name":"ghost"}"#).await;
    assert_eq!(status, 200);

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn helper_output_reaches_the_caller() {
    let tmp = tempfile::tempdir().unwrap();
    let socket = socket_path(tmp.path(), "gcsfuse");
    let registry = Arc::new(Registry::new(
        tmp.path().join("volumes"),
        None,
        Profile::full(),
        Arc::new(FakeFuse::default()),
    ));
    let server = PluginServer::bind(&socket, None, Arc::new(Logging::new(registry))).unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async {
        let _ = stop_rx.await;
    }));

    call(
        &socket,
        "/VolumeDriver.Create",
        r#"{"Name":"locked","Opts":{"bucket":"forbidden","subdir":""}}"#,
    )
    .await;
    let (status, resp) = call(&socket, "/VolumeDriver.Mount", r#"{"Name":"locked","ID":"x"}"#).await;
    assert_eq!(status, 500);
    assert!(resp.err.contains("Error 403: Forbidden"));

    // The failed mount left the volume unmounted.
    let (status, resp) = call(&socket, "/VolumeDriver.Unmount", r#"{"Name":"locked","ID":"x"}"#).await;
    assert_eq!(status, 500);
    assert!(resp.err.contains("not mounted"));

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}
