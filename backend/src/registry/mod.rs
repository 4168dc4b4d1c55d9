//! Device registry: the persisted set of devices and their profiles.

mod json_registry;

pub use json_registry::JsonFileRegistry;

use crate::error::DriverError;
use async_trait::async_trait;
use usbcam_types::{DeviceProfile, RegisteredDevice};

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("device {0} not found in the registry")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for DriverError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DeviceNotFound(_) => DriverError::not_found(err.to_string()),
            other => DriverError::server_with("device registry request failed", other),
        }
    }
}

/// Persistent store of registered devices and device profiles.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn devices(&self) -> Result<Vec<RegisteredDevice>>;

    async fn device(&self, name: &str) -> Result<RegisteredDevice>;

    /// Insert or replace a device by name.
    async fn upsert_device(&self, device: &RegisteredDevice) -> Result<()>;

    async fn delete_device(&self, name: &str) -> Result<()>;

    /// Profile by name, falling back to the built-in USB camera profile.
    async fn profile(&self, name: &str) -> Result<DeviceProfile>;
}
