//! Events for real-time updates across clients.

use crate::api::DiscoveredDevice;
use crate::command::CommandValue;
use serde::{Deserialize, Serialize};

/// Event types that can be broadcast to all connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeviceEvent {
    /// A device became active
    DeviceAdded { device_name: String },
    /// A device was removed and re-added with new configuration
    DeviceUpdated { device_name: String },
    /// A device left the active set
    DeviceRemoved { device_name: String },
    /// A discovery scan found devices that are not registered yet
    DevicesDiscovered { devices: Vec<DiscoveredDevice> },
    /// The resolved device paths of a device changed
    DevicePathsUpdated {
        device_name: String,
        paths: Vec<String>,
    },
    /// Streaming status of a device changed
    StreamingStatus {
        device_name: String,
        reading: CommandValue,
    },
}

impl DeviceEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            DeviceEvent::DeviceAdded { device_name } => format!("Device {} added", device_name),
            DeviceEvent::DeviceUpdated { device_name } => {
                format!("Device {} updated", device_name)
            }
            DeviceEvent::DeviceRemoved { device_name } => {
                format!("Device {} removed", device_name)
            }
            DeviceEvent::DevicesDiscovered { devices } => {
                format!("Discovered {} new device(s)", devices.len())
            }
            DeviceEvent::DevicePathsUpdated { device_name, paths } => {
                format!("Device {} paths updated to [{}]", device_name, paths.join(", "))
            }
            DeviceEvent::StreamingStatus { device_name, .. } => {
                format!("Streaming status of device {} changed", device_name)
            }
        }
    }

    /// Event name, equal to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::DeviceAdded { .. } => "DeviceAdded",
            DeviceEvent::DeviceUpdated { .. } => "DeviceUpdated",
            DeviceEvent::DeviceRemoved { .. } => "DeviceRemoved",
            DeviceEvent::DevicesDiscovered { .. } => "DevicesDiscovered",
            DeviceEvent::DevicePathsUpdated { .. } => "DevicePathsUpdated",
            DeviceEvent::StreamingStatus { .. } => "StreamingStatus",
        }
    }

    /// Device the event concerns; `None` for events spanning devices.
    pub fn device_name(&self) -> Option<&str> {
        match self {
            DeviceEvent::DeviceAdded { device_name }
            | DeviceEvent::DeviceUpdated { device_name }
            | DeviceEvent::DeviceRemoved { device_name }
            | DeviceEvent::DevicePathsUpdated { device_name, .. }
            | DeviceEvent::StreamingStatus { device_name, .. } => Some(device_name),
            DeviceEvent::DevicesDiscovered { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_type_tag() {
        let event = DeviceEvent::DevicePathsUpdated {
            device_name: "cam".to_string(),
            paths: vec!["/dev/video2".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["data"]["paths"][0], "/dev/video2");
        assert_eq!(event.device_name(), Some("cam"));

        let scan = DeviceEvent::DevicesDiscovered { devices: Vec::new() };
        assert_eq!(serde_json::to_value(&scan).unwrap()["type"], scan.kind());
        assert_eq!(scan.device_name(), None);
    }
}
