//! Device manager: owns the active devices and coordinates their lifecycle.
//!
//! The map of active devices is guarded by one mutex that is never held while
//! probing hardware or waiting on a transcoder. Per-device state has its own
//! lock inside [`Device`].

pub mod commands;
pub mod query;

use crate::config::RtspConfig;
use crate::device::{stream_uris, Device, StreamContext, StreamStart};
use crate::error::{DriverError, Result};
use crate::events::EventBroadcaster;
use crate::publisher::{StatusPublisher, DEFAULT_QUEUE_SIZE};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::secrets::{Credentials, SecretStore};
use crate::transcoder::options::TranscodeOptions;
use crate::transcoder::TranscoderSettings;
use crate::usb::{build_device_name, CaptureBackend, DeviceIdentity, HostProbe, PathResolver};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use usbcam_types::api::DeviceSummary;
use usbcam_types::registry::commands::VIDEO_STREAMING_STATUS;
use usbcam_types::{DevicePath, DeviceEvent, DiscoveredDevice, Protocols, UsbProtocol};

/// Collaborators of a [`DeviceManager`].
pub struct ManagerParts {
    pub registry: Arc<dyn DeviceRegistry>,
    pub secrets: Arc<dyn SecretStore>,
    pub probe: Arc<dyn HostProbe>,
    pub capture: Arc<dyn CaptureBackend>,
    pub events: EventBroadcaster,
    pub rtsp: RtspConfig,
    pub transcoder: TranscoderSettings,
}

/// Coordinates active devices. Cheap to clone.
#[derive(Clone)]
pub struct DeviceManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn DeviceRegistry>,
    secrets: Arc<dyn SecretStore>,
    resolver: PathResolver,
    capture: Arc<dyn CaptureBackend>,
    events: EventBroadcaster,
    rtsp: RtspConfig,
    stream: StreamContext,
    devices: Mutex<HashMap<String, Arc<Device>>>,
    stops_in_flight: AtomicUsize,
}

/// Decrements the in-flight stop counter when dropped.
struct StopGuard<'a>(&'a AtomicUsize);

impl<'a> StopGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceManager {
    pub fn new(parts: ManagerParts) -> Self {
        let tracker = TaskTracker::new();
        let publisher = StatusPublisher::start(parts.events.clone(), DEFAULT_QUEUE_SIZE, &tracker);
        Self {
            inner: Arc::new(Inner {
                registry: parts.registry,
                secrets: parts.secrets,
                resolver: PathResolver::new(parts.probe),
                capture: parts.capture,
                events: parts.events,
                rtsp: parts.rtsp,
                stream: StreamContext {
                    settings: parts.transcoder,
                    tracker,
                    publisher,
                },
                devices: Mutex::new(HashMap::new()),
                stops_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<dyn DeviceRegistry> {
        &self.inner.registry
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Number of stop operations currently waiting for a transcoder to exit.
    pub fn stops_in_flight(&self) -> usize {
        self.inner.stops_in_flight.load(Ordering::SeqCst)
    }

    /// Add every registered device, then refresh paths in the background.
    ///
    /// Devices that fail to add are logged and skipped.
    pub async fn initialize(&self) -> Result<()> {
        let registered = self.inner.registry.devices().await?;
        info!("Initializing {} registered device(s)", registered.len());

        for device in registered {
            if let Err(e) = self.add_device(&device.name, &device.protocols).await {
                error!("Failed to add device {}: {}", device.name, e.detailed_message());
            }
        }

        self.refresh_all_in_background();
        Ok(())
    }

    /// Make a registered device active.
    ///
    /// Resolves the device's identity and paths, rejects serial number and
    /// name collisions, and starts streaming when auto-streaming is enabled.
    pub async fn add_device(&self, name: &str, protocols: &Protocols) -> Result<()> {
        let usb = UsbProtocol::from_protocols(protocols)?;

        let registered = self.inner.registry.device(name).await.map_err(|e| match e {
            RegistryError::DeviceNotFound(_) => {
                DriverError::not_found(format!("device {} not found in the registry", name))
            }
            other => other.into(),
        })?;
        let profile = self.inner.registry.profile(&registered.profile_name).await?;
        let status_resource = profile
            .resource_for_command(VIDEO_STREAMING_STATUS)
            .map(|r| r.name.clone());
        if status_resource.is_none() {
            warn!(
                "There is no resource representing the streaming status of device {}, status changes won't be published",
                name
            );
        }

        let (identity, paths) = self.resolve_identity(name, &usb).await?;
        check_conflict(&*self.inner.devices.lock().await, name, &identity)?;

        let needs_backfill = usb.card_name.is_none() || usb.serial_number.is_none();
        if needs_backfill || paths != usb.paths {
            self.persist_usb(name, &identity, &paths, usb.auto_streaming)
                .await
                .map_err(|e| {
                    DriverError::server_with(
                        format!("failed to update the device {} with its identity and paths", name),
                        e,
                    )
                })?;
        }

        let credentials = self.credentials().await;
        let device = Arc::new(Device::new(
            name,
            identity,
            paths,
            usb.auto_streaming,
            status_resource,
            stream_uris(&self.inner.rtsp, name, credentials.as_ref()),
        ));

        {
            let mut devices = self.inner.devices.lock().await;
            check_conflict(&devices, name, device.identity())?;
            devices.insert(name.to_string(), device.clone());
        }

        info!("Device {} ({}) is added", name, device.identity());
        self.inner.events.broadcast(DeviceEvent::DeviceAdded {
            device_name: name.to_string(),
        });

        if device.auto_streaming() {
            let input = device
                .paths()
                .await
                .first()
                .map(|p| p.path.clone())
                .ok_or_else(|| DriverError::not_found(format!("device {} has no path", name)))?;
            self.start_streaming(&device, &input, None).await?;
        }
        Ok(())
    }

    /// Work out the identity and current paths of a device being added.
    async fn resolve_identity(
        &self,
        name: &str,
        usb: &UsbProtocol,
    ) -> Result<(DeviceIdentity, Vec<DevicePath>)> {
        let resolver = &self.inner.resolver;
        let io_error = |e: std::io::Error| {
            DriverError::server_with(format!("failed to resolve paths of device {}", name), e)
        };

        let configured = usb
            .identity()
            .map(|(card, serial)| DeviceIdentity::new(card, serial));
        if let Some(identity) = configured {
            let paths = resolver.resolve_paths(&identity).await.map_err(io_error)?;
            if !paths.is_empty() {
                return Ok((identity, paths));
            }
            debug!("Device {} not found by identity, probing configured paths", name);
        }

        let first = usb.paths.first().ok_or_else(|| {
            DriverError::server(format!(
                "device {} is not connected and has no configured path",
                name
            ))
        })?;
        let probed = resolver.probe_identity(&first.path).await.map_err(|e| {
            DriverError::server_with(
                format!(
                    "could not find the serial number of the device on the specified path {}",
                    first.path
                ),
                e,
            )
        })?;

        if let Some(card) = usb.card_name.as_deref() {
            if card != probed.card_name {
                return Err(DriverError::contract(format!(
                    "wrong device card name, expected CardName={}, actual CardName={}",
                    card, probed.card_name
                )));
            }
        }
        if let Some(serial) = usb.serial_number.as_deref() {
            if serial != probed.serial_number {
                return Err(DriverError::contract(format!(
                    "wrong device serial number, expected SerialNumber={}, actual SerialNumber={}",
                    serial, probed.serial_number
                )));
            }
        }

        let paths = resolver.resolve_paths(&probed).await.map_err(io_error)?;
        if paths.is_empty() {
            return Ok((probed, usb.paths.clone()));
        }
        Ok((probed, paths))
    }

    /// Write identity and paths back to the registry in canonical form.
    async fn persist_usb(
        &self,
        name: &str,
        identity: &DeviceIdentity,
        paths: &[DevicePath],
        auto_streaming: bool,
    ) -> std::result::Result<(), RegistryError> {
        let mut registered = self.inner.registry.device(name).await?;
        let usb = UsbProtocol {
            paths: paths.to_vec(),
            serial_number: Some(identity.serial_number.clone()),
            card_name: Some(identity.card_name.clone()),
            auto_streaming,
        };
        usb.write_into(&mut registered.protocols);
        self.inner.registry.upsert_device(&registered).await?;
        debug!("Updated registry entry of device {}", name);
        Ok(())
    }

    /// Stop streaming and drop the device. Unknown devices are ignored.
    pub async fn remove_device(&self, name: &str) {
        let removed = self.inner.devices.lock().await.remove(name);
        if let Some(device) = removed {
            self.stop_device(&device).await;
            info!("Device {} is removed", name);
            self.inner.events.broadcast(DeviceEvent::DeviceRemoved {
                device_name: name.to_string(),
            });
        }
    }

    /// Replace a device with new protocol properties.
    ///
    /// The device is briefly absent while it is removed and added again.
    pub async fn update_device(&self, name: &str, protocols: &Protocols) -> Result<()> {
        self.remove_device(name).await;
        self.add_device(name, protocols).await?;
        debug!("Device {} is updated", name);
        self.inner.events.broadcast(DeviceEvent::DeviceUpdated {
            device_name: name.to_string(),
        });
        Ok(())
    }

    /// Active device by name.
    ///
    /// On a miss the device is added once more from the registry before the
    /// lookup is declared failed.
    pub async fn device(&self, name: &str) -> Result<Arc<Device>> {
        if let Some(device) = self.active(name).await {
            return Ok(device);
        }

        let not_found = || DriverError::not_found(format!("device {} not found", name));
        let registered = match self.inner.registry.device(name).await {
            Ok(registered) => registered,
            Err(RegistryError::DeviceNotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        debug!("Device {} is not active, adding it from the registry", name);
        let added = self.add_device(name, &registered.protocols).await;
        // A failed auto-start leaves the device active with the error in its status.
        if let Some(device) = self.active(name).await {
            if let Err(e) = added {
                warn!("Device {} was re-added with an error: {}", name, e.detailed_message());
            }
            return Ok(device);
        }
        match added {
            Ok(()) | Err(DriverError::Conflict(_)) => Err(not_found()),
            Err(e) => {
                warn!("Failed to re-add device {}: {}", name, e.detailed_message());
                Err(e)
            }
        }
    }

    async fn active(&self, name: &str) -> Option<Arc<Device>> {
        self.inner.devices.lock().await.get(name).cloned()
    }

    /// Snapshot of the active devices, sorted by name.
    pub async fn devices(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<_> = self.inner.devices.lock().await.values().cloned().collect();
        devices.sort_by(|a, b| a.name().cmp(b.name()));
        devices
    }

    pub async fn summary(&self, device: &Device) -> DeviceSummary {
        DeviceSummary {
            name: device.name().to_string(),
            card_name: device.identity().card_name.clone(),
            serial_number: device.identity().serial_number.clone(),
            paths: device.paths().await.into_iter().map(|p| p.path).collect(),
            auto_streaming: device.auto_streaming(),
            stream_uri: device.stream_uris().await.public,
            streaming_status: device.status().await,
        }
    }

    /// Start streaming `input` and wait for the startup outcome.
    ///
    /// Returns as soon as the transcoder reports progress. An exit with an
    /// error inside the grace window fails the start. Silence for the whole
    /// window is taken as success.
    pub async fn start_streaming(
        &self,
        device: &Arc<Device>,
        input: &str,
        options: Option<TranscodeOptions>,
    ) -> Result<()> {
        let ctx = &self.inner.stream;
        let StreamStart { progress, exit } = device.start_streaming(input, options, ctx).await?;

        let outcome = tokio::select! {
            Ok(()) = progress => {
                info!("Start video streaming for device {}", device.name());
                Ok(())
            }
            exited = exit => match exited {
                Ok(Some(message)) => Err(DriverError::server(message)),
                _ => {
                    warn!("Transcoder of device {} exited right after start", device.name());
                    Ok(())
                }
            },
            _ = tokio::time::sleep(ctx.settings.startup_grace) => {
                warn!(
                    "No progress from the transcoder of device {} within {:?}, assuming it is running",
                    device.name(),
                    ctx.settings.startup_grace
                );
                Ok(())
            }
        };

        device.publish_status(&ctx.publisher).await;
        outcome
    }

    /// Stop streaming on `device` and wait for the transcoder to exit.
    pub async fn stop_device(&self, device: &Device) {
        let _guard = StopGuard::new(&self.inner.stops_in_flight);
        device.stop_streaming().await;
    }

    pub(crate) fn publisher(&self) -> &StatusPublisher {
        &self.inner.stream.publisher
    }

    /// Re-resolve the paths of `device`, persisting them when they changed.
    /// Returns whether they changed.
    pub async fn refresh_device_paths(&self, device: &Device) -> Result<bool> {
        let paths = self
            .inner
            .resolver
            .resolve_paths(device.identity())
            .await
            .map_err(|e| {
                DriverError::server_with(
                    format!("failed to resolve paths of device {}", device.name()),
                    e,
                )
            })?;

        if paths.is_empty() {
            debug!("Device {} is not connected, keeping its paths", device.name());
            return Ok(false);
        }
        if !device.set_paths(paths.clone()).await {
            return Ok(false);
        }

        let plain: Vec<String> = paths.iter().map(|p| p.path.clone()).collect();
        info!("Paths of device {} changed to {:?}", device.name(), plain);
        self.persist_usb(device.name(), device.identity(), &paths, device.auto_streaming())
            .await
            .map_err(|e| {
                DriverError::server_with(
                    format!("failed to update the paths of device {}", device.name()),
                    e,
                )
            })?;
        self.inner.events.broadcast(DeviceEvent::DevicePathsUpdated {
            device_name: device.name().to_string(),
            paths: plain,
        });
        Ok(true)
    }

    /// Refresh the paths of every active device. Failures are logged.
    pub async fn refresh_all(&self) {
        for device in self.devices().await {
            if let Err(e) = self.refresh_device_paths(&device).await {
                warn!("{}", e.detailed_message());
            }
        }
    }

    pub fn refresh_all_in_background(&self) {
        let manager = self.clone();
        self.inner
            .stream
            .tracker
            .spawn(async move { manager.refresh_all().await });
    }

    pub fn refresh_in_background(&self, device: Arc<Device>) {
        let manager = self.clone();
        self.inner.stream.tracker.spawn(async move {
            if let Err(e) = manager.refresh_device_paths(&device).await {
                warn!("{}", e.detailed_message());
            }
        });
    }

    /// Scan the host for cameras that are not registered yet.
    ///
    /// Cameras of active devices get a background path refresh instead.
    /// Probe failures on single paths are logged and skipped.
    pub async fn discover(&self) -> Result<Vec<DiscoveredDevice>> {
        let cameras = self
            .inner
            .resolver
            .scan()
            .await
            .map_err(|e| DriverError::server_with("failed to scan video devices", e))?;

        let active: HashMap<DeviceIdentity, Arc<Device>> = self
            .devices()
            .await
            .into_iter()
            .map(|d| (d.identity().clone(), d))
            .collect();
        let registered: HashSet<DeviceIdentity> = self
            .inner
            .registry
            .devices()
            .await?
            .iter()
            .filter_map(|d| UsbProtocol::from_protocols(&d.protocols).ok())
            .filter_map(|usb| {
                usb.identity()
                    .map(|(card, serial)| DeviceIdentity::new(card, serial))
            })
            .collect();

        let mut discovered = Vec::new();
        for camera in cameras {
            if let Some(device) = active.get(&camera.identity) {
                self.refresh_in_background(device.clone());
                continue;
            }
            if registered.contains(&camera.identity) {
                debug!("Camera {} is registered but not active", camera.identity);
                continue;
            }

            let usb = UsbProtocol {
                paths: camera.paths,
                serial_number: Some(camera.identity.serial_number.clone()),
                card_name: Some(camera.identity.card_name.clone()),
                auto_streaming: false,
            };
            let mut protocols = Protocols::new();
            usb.write_into(&mut protocols);

            let device = DiscoveredDevice {
                name: build_device_name(&camera.identity.card_name, &camera.identity.serial_number),
                protocols,
                description: format!("USB camera {}", camera.identity.card_name),
                labels: vec!["auto-discovery".to_string(), camera.identity.card_name.clone()],
            };
            info!("Discovered device: {}", device.name);
            discovered.push(device);
        }

        if !discovered.is_empty() {
            self.inner.events.broadcast(DeviceEvent::DevicesDiscovered {
                devices: discovered.clone(),
            });
        }
        Ok(discovered)
    }

    async fn credentials(&self) -> Option<Credentials> {
        let secret = &self.inner.rtsp.credential_secret;
        match self.inner.secrets.credentials(secret).await {
            Ok(Some(credentials)) => Some(credentials),
            Ok(None) => {
                debug!("No credentials stored under {}, streams are published without them", secret);
                None
            }
            Err(e) => {
                warn!("Failed to read credentials {}: {}", secret, e);
                None
            }
        }
    }

    /// Re-derive the output URIs of every active device after the stream
    /// credentials changed.
    pub async fn on_secret_updated(&self) {
        let credentials = self.credentials().await;
        let devices = self.devices().await;
        for device in &devices {
            let uris = stream_uris(&self.inner.rtsp, device.name(), credentials.as_ref());
            device.set_stream_uris(uris).await;
        }
        info!("Updated stream credentials of {} device(s)", devices.len());
    }

    /// Stop every stream concurrently, then wait for all background work.
    pub async fn shutdown(&self) {
        let devices = self.devices().await;
        info!("Stopping {} device(s)", devices.len());
        futures::future::join_all(devices.iter().map(|d| self.stop_device(d))).await;

        let ctx = &self.inner.stream;
        ctx.publisher.shutdown();
        ctx.tracker.close();
        ctx.tracker.wait().await;
        info!("Device manager stopped");
    }
}

/// Reject a device whose name or serial number is already active.
fn check_conflict(
    devices: &HashMap<String, Arc<Device>>,
    name: &str,
    identity: &DeviceIdentity,
) -> Result<()> {
    if devices.contains_key(name) {
        return Err(DriverError::Conflict(format!("device {} is already active", name)));
    }
    match devices
        .values()
        .find(|d| d.identity().serial_number == identity.serial_number)
    {
        Some(existing) => Err(DriverError::Conflict(format!(
            "the serial number {} conflicts with existing device {}",
            identity.serial_number,
            existing.name()
        ))),
        None => Ok(()),
    }
}
