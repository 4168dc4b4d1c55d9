//! Maps cameras to their current device paths.

use super::identity::DeviceIdentity;
use super::probe::HostProbe;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};
use usbcam_types::DevicePath;

/// A camera found on the host with all of its capture paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCamera {
    pub identity: DeviceIdentity,
    pub paths: Vec<DevicePath>,
}

/// Resolves identities to paths by probing every capture-capable node.
#[derive(Clone)]
pub struct PathResolver {
    probe: Arc<dyn HostProbe>,
}

impl PathResolver {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self { probe }
    }

    pub async fn probe_identity(&self, path: &str) -> io::Result<DeviceIdentity> {
        self.probe.identity(path).await
    }

    pub async fn is_capture_capable(&self, path: &str) -> bool {
        self.probe.is_capture_capable(path).await
    }

    /// Every capture path currently belonging to `identity`, in enumeration
    /// order. An empty list means the camera is not connected right now.
    pub async fn resolve_paths(&self, identity: &DeviceIdentity) -> io::Result<Vec<DevicePath>> {
        let cameras = self.scan().await?;
        Ok(cameras
            .into_iter()
            .find(|camera| &camera.identity == identity)
            .map(|camera| camera.paths)
            .unwrap_or_default())
    }

    /// Probe all capture-capable nodes and group them by identity.
    ///
    /// Cameras are ordered by their first path. Nodes whose identity cannot be
    /// probed are logged and skipped.
    pub async fn scan(&self) -> io::Result<Vec<HostCamera>> {
        let mut cameras: Vec<HostCamera> = Vec::new();

        for path in self.probe.video_paths().await? {
            if !self.probe.is_capture_capable(&path).await {
                debug!("Skipping {}: not a video capture device", path);
                continue;
            }

            let identity = match self.probe.identity(&path).await {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    continue;
                }
            };

            let entry = match self.probe.format_description(&path).await {
                Ok(desc) => DevicePath::with_format(path, desc),
                Err(e) => {
                    debug!("No format description for {}: {}", path, e);
                    DevicePath::new(path)
                }
            };

            match cameras.iter_mut().find(|c| c.identity == identity) {
                Some(camera) => camera.paths.push(entry),
                None => cameras.push(HostCamera {
                    identity,
                    paths: vec![entry],
                }),
            }
        }

        Ok(cameras)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Probe serving a fixed set of nodes.
    #[derive(Default)]
    pub struct FakeProbe {
        /// index -> (capture capable, identity, format description)
        pub nodes: BTreeMap<u32, (bool, Option<DeviceIdentity>, String)>,
    }

    impl FakeProbe {
        pub fn with_node(
            mut self,
            index: u32,
            capable: bool,
            identity: Option<DeviceIdentity>,
            format: &str,
        ) -> Self {
            self.nodes
                .insert(index, (capable, identity, format.to_string()));
            self
        }

        fn node(&self, path: &str) -> Option<&(bool, Option<DeviceIdentity>, String)> {
            let index = path.strip_prefix("/dev/video")?.parse().ok()?;
            self.nodes.get(&index)
        }
    }

    #[async_trait]
    impl HostProbe for FakeProbe {
        async fn video_paths(&self) -> io::Result<Vec<String>> {
            Ok(self
                .nodes
                .keys()
                .map(|index| format!("/dev/video{}", index))
                .collect())
        }

        async fn is_capture_capable(&self, path: &str) -> bool {
            self.node(path).map(|n| n.0).unwrap_or(false)
        }

        async fn identity(&self, path: &str) -> io::Result<DeviceIdentity> {
            self.node(path)
                .and_then(|n| n.1.clone())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no identity"))
        }

        async fn format_description(&self, path: &str) -> io::Result<String> {
            self.node(path)
                .map(|n| n.2.clone())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
        }
    }

    fn cam(serial: &str) -> DeviceIdentity {
        DeviceIdentity::new("UVC Camera", serial)
    }

    #[tokio::test]
    async fn test_resolve_paths_in_enumeration_order() {
        let probe = FakeProbe::default()
            .with_node(4, true, Some(cam("A")), "Z16")
            .with_node(0, true, Some(cam("A")), "YUYV 4:2:2")
            .with_node(1, false, Some(cam("A")), "")
            .with_node(2, true, Some(cam("A")), "8-bit Greyscale")
            .with_node(3, true, Some(cam("B")), "MJPG");
        let resolver = PathResolver::new(Arc::new(probe));

        let paths = resolver.resolve_paths(&cam("A")).await.unwrap();
        let plain: Vec<_> = paths.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(plain, vec!["/dev/video0", "/dev/video2", "/dev/video4"]);
        assert_eq!(paths[2].format_description.as_deref(), Some("Z16"));
    }

    #[tokio::test]
    async fn test_disconnected_camera_resolves_to_empty() {
        let probe = FakeProbe::default().with_node(0, true, Some(cam("A")), "YUYV");
        let resolver = PathResolver::new(Arc::new(probe));
        assert!(resolver.resolve_paths(&cam("Z")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_skips_unprobeable_nodes() {
        let probe = FakeProbe::default()
            .with_node(0, true, None, "YUYV")
            .with_node(2, true, Some(cam("B")), "YUYV")
            .with_node(10, true, Some(cam("A")), "YUYV")
            .with_node(3, true, Some(cam("B")), "GREY");
        let resolver = PathResolver::new(Arc::new(probe));

        let cameras = resolver.scan().await.unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].identity, cam("B"));
        assert_eq!(cameras[0].paths.len(), 2);
        assert_eq!(cameras[1].identity, cam("A"));
        assert_eq!(cameras[1].paths[0].path, "/dev/video10");
    }
}
