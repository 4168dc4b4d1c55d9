//! Host level probing of video device nodes.

use super::capture::CaptureBackend;
use super::identity::DeviceIdentity;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, trace};

/// Host facilities the path resolver relies on.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// All video device nodes present on the host, in numeric order.
    async fn video_paths(&self) -> io::Result<Vec<String>>;

    /// Whether `path` supports both video capture and streaming.
    async fn is_capture_capable(&self, path: &str) -> bool;

    /// Card name and serial number of the camera behind `path`.
    async fn identity(&self, path: &str) -> io::Result<DeviceIdentity>;

    /// Description of the pixel format `path` currently produces.
    async fn format_description(&self, path: &str) -> io::Result<String>;
}

/// Probe using `udevadm` for identities and V4L2 for capabilities.
pub struct UdevProbe {
    capture: Arc<dyn CaptureBackend>,
    udevadm: String,
}

impl UdevProbe {
    pub fn new(capture: Arc<dyn CaptureBackend>) -> Self {
        Self {
            capture,
            udevadm: "udevadm".to_string(),
        }
    }
}

/// Paths of the Video4Linux nodes, ordered by node index.
fn video_nodes() -> Vec<String> {
    by_index(
        v4l::context::enum_devices()
            .into_iter()
            .map(|node| (node.index(), node.path().to_string_lossy().into_owned())),
    )
}

fn by_index(nodes: impl IntoIterator<Item = (usize, String)>) -> Vec<String> {
    let mut nodes: Vec<_> = nodes.into_iter().collect();
    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, path)| path).collect()
}

#[async_trait]
impl HostProbe for UdevProbe {
    async fn video_paths(&self) -> io::Result<Vec<String>> {
        let nodes = tokio::task::spawn_blocking(video_nodes)
            .await
            .map_err(io::Error::other)?;
        trace!("Found {} video nodes", nodes.len());
        Ok(nodes)
    }

    async fn is_capture_capable(&self, path: &str) -> bool {
        let capture = self.capture.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || capture.is_capture_capable(&path))
            .await
            .unwrap_or(false)
    }

    async fn identity(&self, path: &str) -> io::Result<DeviceIdentity> {
        let output = Command::new(&self.udevadm)
            .args(["info", "--query=property", "--name", path])
            .output()
            .await?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "udevadm failed for {}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let identity = DeviceIdentity::from_udev_properties(&stdout).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no card name or serial number found for {}", path),
            )
        })?;
        debug!("Probed {} as {}", path, identity);
        Ok(identity)
    }

    async fn format_description(&self, path: &str) -> io::Result<String> {
        let capture = self.capture.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || capture.open(&path)?.format_description())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_ordered_by_index() {
        let nodes = vec![
            (10, "/dev/video10".to_string()),
            (2, "/dev/video2".to_string()),
            (0, "/dev/video0".to_string()),
        ];
        assert_eq!(
            by_index(nodes),
            vec!["/dev/video0", "/dev/video2", "/dev/video10"]
        );
    }
}
