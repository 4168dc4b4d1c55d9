//! Discovery of unregistered cameras.
//!
//! Scans run on demand and, when configured, on a fixed interval. Every
//! non-empty result is handed to a provisioner task over a channel; with
//! auto-provisioning enabled the provisioner registers and adds each device.

use crate::config::DiscoveryConfig;
use crate::manager::DeviceManager;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use usbcam_types::{DiscoveredDevice, RegisteredDevice};

/// Pending scan results before new ones are dropped.
const DISCOVERY_QUEUE_SIZE: usize = 16;

/// Runs discovery scans and provisions what they find. Cheap to clone.
#[derive(Clone)]
pub struct DiscoveryService {
    inner: Arc<DiscoveryServiceInner>,
}

struct DiscoveryServiceInner {
    manager: DeviceManager,
    config: DiscoveryConfig,
    /// Result of the most recent scan.
    last_scan: RwLock<Vec<DiscoveredDevice>>,
    /// Serializes scans so triggers arriving together do not probe twice.
    scan_lock: Mutex<()>,
    found_tx: mpsc::Sender<Vec<DiscoveredDevice>>,
    found_rx: Mutex<Option<mpsc::Receiver<Vec<DiscoveredDevice>>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
}

impl DiscoveryService {
    pub fn new(manager: DeviceManager, config: DiscoveryConfig) -> Self {
        let (found_tx, found_rx) = mpsc::channel(DISCOVERY_QUEUE_SIZE);
        Self {
            inner: Arc::new(DiscoveryServiceInner {
                manager,
                config,
                last_scan: RwLock::new(Vec::new()),
                scan_lock: Mutex::new(()),
                found_tx,
                found_rx: Mutex::new(Some(found_rx)),
                shutdown_tx: RwLock::new(None),
            }),
        }
    }

    /// Start the provisioner and, if an interval is configured, periodic scans.
    pub async fn start(&self) {
        let Some(found_rx) = self.inner.found_rx.lock().await.take() else {
            warn!("Discovery service already running");
            return;
        };

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        *self.inner.shutdown_tx.write().await = Some(shutdown_tx.clone());

        let inner = self.inner.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            Self::run_provisioner(inner, found_rx, shutdown).await;
        });

        match self.inner.config.interval() {
            Some(interval) => {
                let service = self.clone();
                let mut shutdown = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                if let Err(e) = service.scan().await {
                                    error!("Periodic discovery failed: {}", e.detailed_message());
                                }
                            }
                            _ = shutdown.recv() => {
                                debug!("Periodic discovery stopped");
                                break;
                            }
                        }
                    }
                });
                info!(
                    "Discovery service started (every {:?}, auto-provision {})",
                    interval, self.inner.config.auto_provision
                );
            }
            None => info!(
                "Discovery service started (on demand, auto-provision {})",
                self.inner.config.auto_provision
            ),
        }
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.inner.shutdown_tx.write().await.take() {
            let _ = tx.send(());
            info!("Discovery service stopped");
        }
    }

    /// Run a scan in the background.
    pub fn trigger(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.scan().await {
                error!("Discovery failed: {}", e.detailed_message());
            }
        });
    }

    /// Scan now and queue the result for provisioning.
    pub async fn scan(&self) -> crate::error::Result<Vec<DiscoveredDevice>> {
        let _scan = self.inner.scan_lock.lock().await;
        let found = self.inner.manager.discover().await?;
        debug!("Discovery found {} new device(s)", found.len());
        *self.inner.last_scan.write().await = found.clone();

        if !found.is_empty() {
            if let Err(e) = self.inner.found_tx.try_send(found.clone()) {
                warn!("Discovery queue is full, dropping scan result: {}", e);
            }
        }
        Ok(found)
    }

    /// Devices found by the most recent scan.
    pub async fn last_scan(&self) -> Vec<DiscoveredDevice> {
        self.inner.last_scan.read().await.clone()
    }

    async fn run_provisioner(
        inner: Arc<DiscoveryServiceInner>,
        mut found_rx: mpsc::Receiver<Vec<DiscoveredDevice>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                found = found_rx.recv() => {
                    let Some(found) = found else { break };
                    if !inner.config.auto_provision {
                        for device in &found {
                            info!("Device {} is available for registration", device.name);
                        }
                        continue;
                    }
                    for device in found {
                        provision(&inner.manager, device).await;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        debug!("Discovery provisioner stopped");
    }
}

/// Register `discovered` and make it active.
async fn provision(manager: &DeviceManager, discovered: DiscoveredDevice) {
    let name = discovered.name.clone();
    let registered = RegisteredDevice::from(discovered);
    if let Err(e) = manager.registry().upsert_device(&registered).await {
        error!("Failed to register discovered device {}: {}", name, e);
        return;
    }
    match manager.add_device(&name, &registered.protocols).await {
        Ok(()) => info!("Provisioned discovered device {}", name),
        Err(e) => error!("Failed to add discovered device {}: {}", name, e.detailed_message()),
    }
}
