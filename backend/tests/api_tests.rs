//! Integration tests for the device service API.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use usbcam::config::{DiscoveryConfig, RtspConfig};
use usbcam::create_app;
use usbcam::discovery::DiscoveryService;
use usbcam::events::EventBroadcaster;
use usbcam::manager::{DeviceManager, ManagerParts};
use usbcam::registry::{DeviceRegistry, JsonFileRegistry};
use usbcam::secrets::FileSecretStore;
use usbcam::state::AppState;
use usbcam::transcoder::TranscoderSettings;
use usbcam::usb::{CaptureBackend, CaptureDevice, DeviceIdentity, HostProbe};
use usbcam_types::api::{DeviceListResponse, DeviceResponse, ReadCommandResponse};

/// One camera, "UVC Camera" serial A1, on /dev/video0.
struct SingleCamera;

#[async_trait]
impl HostProbe for SingleCamera {
    async fn video_paths(&self) -> io::Result<Vec<String>> {
        Ok(vec!["/dev/video0".to_string()])
    }

    async fn is_capture_capable(&self, path: &str) -> bool {
        path == "/dev/video0"
    }

    async fn identity(&self, path: &str) -> io::Result<DeviceIdentity> {
        match path {
            "/dev/video0" => Ok(DeviceIdentity::new("UVC Camera", "A1")),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, path.to_string())),
        }
    }

    async fn format_description(&self, _path: &str) -> io::Result<String> {
        Ok("YUYV 4:2:2".to_string())
    }
}

struct NoCapture;

impl CaptureBackend for NoCapture {
    fn open(&self, path: &str) -> io::Result<Box<dyn CaptureDevice>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, path.to_string()))
    }
}

struct TestApp {
    _dir: TempDir,
    app: Router,
    registry: Arc<JsonFileRegistry>,
    manager: DeviceManager,
}

/// Transcoder that reports progress and runs until asked to quit.
const TRANSCODER_SCRIPT: &str =
    "echo '[info] Press [q] to stop, [?] for help' >&2; read -r _; exit 0";

fn create_test_app(discovery: DiscoveryConfig) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JsonFileRegistry::new(dir.path().join("registry.json")));
    let secrets = Arc::new(FileSecretStore::open(dir.path().join("secrets.json")).unwrap());

    let mut transcoder = TranscoderSettings::new(&Default::default(), &RtspConfig::default());
    transcoder.program = "sh".to_string();
    transcoder.leading_args = vec![
        "-c".to_string(),
        TRANSCODER_SCRIPT.to_string(),
        "transcoder".to_string(),
    ];
    transcoder.startup_grace = Duration::from_secs(2);
    transcoder.stop_timeout = Duration::from_secs(2);

    let manager = DeviceManager::new(ManagerParts {
        registry: registry.clone(),
        secrets,
        probe: Arc::new(SingleCamera),
        capture: Arc::new(NoCapture),
        events: EventBroadcaster::default(),
        rtsp: RtspConfig::default(),
        transcoder,
    });
    let discovery = DiscoveryService::new(manager.clone(), discovery);
    let app = create_app(AppState::new(manager.clone(), discovery));

    TestApp {
        _dir: dir,
        app,
        registry,
        manager,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn camera_device(name: &str) -> Value {
    json!({
        "device": {
            "name": name,
            "protocols": { "USB": { "Paths": ["/dev/video0"] } }
        }
    })
}

#[tokio::test]
async fn test_health_check() {
    let test = create_test_app(DiscoveryConfig::default());
    let (status, _) = send(&test.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_devices_empty() {
    let test = create_test_app(DiscoveryConfig::default());
    let (status, body) = send(&test.app, "GET", "/api/devices", None).await;
    assert_eq!(status, StatusCode::OK);
    let list: DeviceListResponse = serde_json::from_value(body).unwrap();
    assert!(list.devices.is_empty());
}

#[tokio::test]
async fn test_device_lifecycle() {
    let test = create_test_app(DiscoveryConfig::default());

    let (status, body) = send(&test.app, "POST", "/api/devices", Some(camera_device("cam"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: DeviceResponse = serde_json::from_value(body).unwrap();
    assert_eq!(created.device.serial_number, "A1");
    assert_eq!(created.device.paths, vec!["/dev/video0"]);
    assert_eq!(created.device.stream_uri, "rtsp://localhost:8554/stream/cam");

    // The legacy string path list was stored canonically with the probed identity.
    let stored = test.registry.device("cam").await.unwrap();
    assert_eq!(stored.protocols["USB"]["SerialNumber"], "A1");
    assert_eq!(stored.protocols["USB"]["Paths"][0]["Path"], "/dev/video0");

    let (status, _) = send(&test.app, "POST", "/api/devices", Some(camera_device("cam"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&test.app, "POST", "/api/devices", Some(camera_device("twin"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "the serial number A1 conflicts with existing device cam");

    let (status, _) = send(&test.app, "DELETE", "/api/devices/cam", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&test.app, "GET", "/api/devices/cam", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&test.app, "DELETE", "/api/devices/cam", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_streaming_commands() {
    let test = create_test_app(DiscoveryConfig::default());
    let (status, _) = send(&test.app, "POST", "/api/devices", Some(camera_device("cam"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &test.app,
        "PUT",
        "/api/devices/cam/commands/StartStreaming",
        Some(json!({ "OutputFps": "15" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &test.app,
        "GET",
        "/api/devices/cam/commands/StreamingStatus",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let read: ReadCommandResponse = serde_json::from_value(body).unwrap();
    assert_eq!(read.readings[0].value["IsStreaming"], true);
    assert_eq!(read.readings[0].value["OutputFps"], "15");

    let (status, _) = send(
        &test.app,
        "PUT",
        "/api/devices/cam/commands/StartStreaming",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &test.app,
        "PUT",
        "/api/devices/cam/commands/StopStreaming",
        Some(json!(true)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &test.app,
        "GET",
        "/api/devices/cam/commands/StreamingStatus",
        None,
    )
    .await;
    assert_eq!(body["readings"][0]["value"]["IsStreaming"], false);

    test.manager.shutdown().await;
}

#[tokio::test]
async fn test_command_errors() {
    let test = create_test_app(DiscoveryConfig::default());
    send(&test.app, "POST", "/api/devices", Some(camera_device("cam"))).await;

    let (status, body) = send(
        &test.app,
        "GET",
        "/api/devices/cam/commands/CameraStatus",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "mandatory query parameter InputIndex not found");

    let (status, _) = send(
        &test.app,
        "GET",
        "/api/devices/cam/commands/StreamURI?PathIndex=0&StreamFormat=RGB",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The capture backend refuses to open the node.
    let (status, body) = send(
        &test.app,
        "GET",
        "/api/devices/cam/commands/CameraInfo",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "failed to open the underlying device at specified path /dev/video0"
    );

    let (status, _) = send(&test.app, "GET", "/api/devices/cam/commands/Zoom", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&test.app, "GET", "/api/devices/ghost/commands/StreamURI", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_discovery_and_refresh_are_accepted() {
    let test = create_test_app(DiscoveryConfig::default());

    let (status, body) = send(&test.app, "POST", "/api/refreshdevicepaths", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["message"].is_string());

    let (status, _) = send(&test.app, "POST", "/api/discovery", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_auto_provisioning() {
    let test = create_test_app(DiscoveryConfig::default());
    let discovery = DiscoveryService::new(
        test.manager.clone(),
        DiscoveryConfig {
            interval_secs: 0,
            auto_provision: true,
        },
    );
    discovery.start().await;

    let found = discovery.scan().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "UVC_Camera-A1");

    let mut provisioned = false;
    for _ in 0..50 {
        if test.manager.device("UVC_Camera-A1").await.is_ok() {
            provisioned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(provisioned);

    let registered = test.registry.device("UVC_Camera-A1").await.unwrap();
    assert_eq!(registered.description, "USB camera UVC Camera");

    // Active cameras are not offered again.
    assert!(discovery.scan().await.unwrap().is_empty());
    discovery.stop().await;
}

#[tokio::test]
async fn test_events_stream_per_device() {
    let test = create_test_app(DiscoveryConfig::default());
    let request = Request::builder()
        .uri("/api/events?device=cam")
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_version() {
    let test = create_test_app(DiscoveryConfig::default());
    let (status, body) = send(&test.app, "GET", "/api/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
