//! Application state shared by the HTTP handlers.

use crate::discovery::DiscoveryService;
use crate::events::EventBroadcaster;
use crate::manager::DeviceManager;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    manager: DeviceManager,
    discovery: DiscoveryService,
}

impl AppState {
    pub fn new(manager: DeviceManager, discovery: DiscoveryService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { manager, discovery }),
        }
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.inner.manager
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.inner.discovery
    }

    pub fn events(&self) -> &EventBroadcaster {
        self.inner.manager.events()
    }
}
