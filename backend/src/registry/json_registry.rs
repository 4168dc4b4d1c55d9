//! JSON file based device registry.

use super::{DeviceRegistry, RegistryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use usbcam_types::{DeviceProfile, RegisteredDevice, UsbProtocol};

/// Current file format. Version 1 files may hold legacy path properties.
const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFormat {
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(default)]
    devices: Vec<RegisteredDevice>,
    #[serde(default)]
    profiles: Vec<DeviceProfile>,
}

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Clone, Default)]
struct RegistryData {
    devices: BTreeMap<String, RegisteredDevice>,
    profiles: BTreeMap<String, DeviceProfile>,
}

/// Registry persisted to a JSON file.
pub struct JsonFileRegistry {
    path: PathBuf,
    cache: RwLock<Option<RegistryData>>,
}

impl JsonFileRegistry {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
        }
    }

    /// Load the registry, using the cache if available.
    ///
    /// Devices with legacy protocol properties are migrated and the file is
    /// rewritten in the current format.
    async fn load(&self) -> Result<RegistryData> {
        {
            let cache = self.cache.read().await;
            if let Some(data) = cache.as_ref() {
                return Ok(data.clone());
            }
        }

        debug!("Loading device registry from {:?}", self.path);

        if !self.path.exists() {
            info!("Registry file does not exist, starting with no devices");
            return Ok(RegistryData::default());
        }

        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            info!("Registry file is empty, starting with no devices");
            return Ok(RegistryData::default());
        }

        let format: RegistryFormat = serde_json::from_str(&contents)?;
        let mut migrated = format.version < FORMAT_VERSION;

        let mut data = RegistryData::default();
        for mut device in format.devices {
            migrated |= canonicalize(&mut device);
            data.devices.insert(device.name.clone(), device);
        }
        for profile in format.profiles {
            data.profiles.insert(profile.name.clone(), profile);
        }

        info!("Loaded {} devices from registry", data.devices.len());

        if migrated {
            info!(
                "Migrating registry {:?} to format version {}",
                self.path, FORMAT_VERSION
            );
            self.write(&data).await?;
        } else {
            *self.cache.write().await = Some(data.clone());
        }

        Ok(data)
    }

    /// Write the registry to file and update the cache.
    async fn write(&self, data: &RegistryData) -> Result<()> {
        debug!("Writing {} devices to {:?}", data.devices.len(), self.path);

        let format = RegistryFormat {
            version: FORMAT_VERSION,
            devices: data.devices.values().cloned().collect(),
            profiles: data.profiles.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&format)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write to temporary file first, then rename (atomic operation)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        *self.cache.write().await = Some(data.clone());
        Ok(())
    }

    /// Store a profile, replacing one with the same name.
    pub async fn upsert_profile(&self, profile: DeviceProfile) -> Result<()> {
        let mut data = self.load().await?;
        data.profiles.insert(profile.name.clone(), profile);
        self.write(&data).await
    }
}

/// Rewrite USB protocol properties in canonical form. Returns whether
/// anything changed.
fn canonicalize(device: &mut RegisteredDevice) -> bool {
    let usb = match UsbProtocol::from_protocols(&device.protocols) {
        Ok(usb) => usb,
        Err(e) => {
            warn!("Device {} has invalid protocol properties: {}", device.name, e);
            return false;
        }
    };
    let mut canonical = device.protocols.clone();
    usb.write_into(&mut canonical);
    if canonical == device.protocols {
        return false;
    }
    debug!("Migrated protocol properties of device {}", device.name);
    device.protocols = canonical;
    true
}

#[async_trait]
impl DeviceRegistry for JsonFileRegistry {
    async fn devices(&self) -> Result<Vec<RegisteredDevice>> {
        Ok(self.load().await?.devices.into_values().collect())
    }

    async fn device(&self, name: &str) -> Result<RegisteredDevice> {
        self.load()
            .await?
            .devices
            .remove(name)
            .ok_or_else(|| RegistryError::DeviceNotFound(name.to_string()))
    }

    async fn upsert_device(&self, device: &RegisteredDevice) -> Result<()> {
        let mut data = self.load().await?;
        data.devices.insert(device.name.clone(), device.clone());
        self.write(&data).await
    }

    async fn delete_device(&self, name: &str) -> Result<()> {
        let mut data = self.load().await?;
        if data.devices.remove(name).is_none() {
            return Err(RegistryError::DeviceNotFound(name.to_string()));
        }
        self.write(&data).await
    }

    async fn profile(&self, name: &str) -> Result<DeviceProfile> {
        let data = self.load().await?;
        Ok(data.profiles.get(name).cloned().unwrap_or_else(|| {
            debug!("Profile {} not stored, using the built-in profile", name);
            DeviceProfile::usb_camera()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use usbcam_types::{DevicePath, Protocols};

    fn usb_protocols(usb: serde_json::Value) -> Protocols {
        serde_json::from_value(json!({ "USB": usb })).unwrap()
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("registry.json"));
        assert!(registry.devices().await.unwrap().is_empty());
        assert!(matches!(
            registry.device("cam").await,
            Err(RegistryError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = JsonFileRegistry::new(&path);

        let device = RegisteredDevice::new(
            "cam",
            usb_protocols(json!({ "Paths": [{ "Path": "/dev/video0" }] })),
        );
        registry.upsert_device(&device).await.unwrap();

        // A fresh instance reads what the first one wrote.
        let reopened = JsonFileRegistry::new(&path);
        assert_eq!(reopened.device("cam").await.unwrap().name, "cam");

        registry.delete_device("cam").await.unwrap();
        assert!(registry.devices().await.unwrap().is_empty());
        assert!(registry.delete_device("cam").await.is_err());
    }

    #[tokio::test]
    async fn test_legacy_file_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            json!({
                "devices": [{
                    "name": "cam",
                    "protocols": { "USB": {
                        "Path": "/dev/video0",
                        "CardName": "UVC Camera",
                        "SerialNumber": "A1",
                        "AutoStreaming": "false"
                    }}
                }]
            })
            .to_string(),
        )
        .unwrap();

        let registry = JsonFileRegistry::new(&path);
        let device = registry.device("cam").await.unwrap();
        let usb = UsbProtocol::from_protocols(&device.protocols).unwrap();
        assert_eq!(usb.paths, vec![DevicePath::new("/dev/video0")]);
        assert!(device.protocols["USB"].get("Path").is_none());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["version"], FORMAT_VERSION);
        assert_eq!(
            written["devices"][0]["protocols"]["USB"]["Paths"],
            json!([{ "Path": "/dev/video0" }])
        );
    }

    #[tokio::test]
    async fn test_profile_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("registry.json"));
        let profile = registry.profile("USB-Camera-General").await.unwrap();
        assert_eq!(profile, DeviceProfile::usb_camera());

        let custom = DeviceProfile {
            name: "Custom".to_string(),
            resources: Vec::new(),
        };
        registry.upsert_profile(custom.clone()).await.unwrap();
        assert_eq!(registry.profile("Custom").await.unwrap(), custom);
    }
}
