//! USB protocol properties.
//!
//! The registry stores protocol properties as loosely typed JSON maps. Three
//! shapes of the device path property have existed over time:
//!
//! 1. `"Path": "/dev/video0"` (single string, deprecated)
//! 2. `"Paths": ["/dev/video0", "/dev/video2"]`
//! 3. `"Paths": [{"Path": "/dev/video0", "FormatDescription": "YUYV 4:2:2"}]`
//!
//! [`UsbProtocol::from_protocols`] accepts all of them and produces the
//! canonical structured list; [`UsbProtocol::write_into`] always writes shape 3.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Name of the protocol block holding USB camera properties.
pub const USB_PROTOCOL: &str = "USB";

pub const PATHS: &str = "Paths";
pub const LEGACY_PATH: &str = "Path";
pub const SERIAL_NUMBER: &str = "SerialNumber";
pub const CARD_NAME: &str = "CardName";
pub const AUTO_STREAMING: &str = "AutoStreaming";
const FORMAT_DESCRIPTION: &str = "FormatDescription";

/// Protocol property blocks keyed by protocol name.
pub type Protocols = BTreeMap<String, Map<String, Value>>;

/// One device file through which a camera is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct DevicePath {
    /// Device file, e.g. `/dev/video0`.
    pub path: String,
    /// Description of the pixel format probed on this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_description: Option<String>,
}

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format_description: None,
        }
    }

    pub fn with_format(path: impl Into<String>, format_description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format_description: Some(format_description.into()),
        }
    }
}

/// Validated USB protocol properties of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbProtocol {
    pub paths: Vec<DevicePath>,
    pub serial_number: Option<String>,
    pub card_name: Option<String>,
    pub auto_streaming: bool,
}

/// Error raised when protocol properties are missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MissingProtocol(String),
    MissingProperty { protocol: String, property: String },
    InvalidProperty { property: String, reason: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProtocol(protocol) => write!(
                f,
                "{} protocol configuration not found, please check device configuration",
                protocol
            ),
            Self::MissingProperty { protocol, property } => write!(
                f,
                "property {} of protocol {} is missing, please check device configuration",
                property, protocol
            ),
            Self::InvalidProperty { property, reason } => {
                write!(f, "invalid value for property {}: {}", property, reason)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl UsbProtocol {
    /// Parse the USB block out of a device's protocol properties.
    ///
    /// An empty path list is valid. A missing USB block or a missing path
    /// property is an error.
    pub fn from_protocols(protocols: &Protocols) -> Result<Self, ProtocolError> {
        let props = protocols
            .get(USB_PROTOCOL)
            .ok_or_else(|| ProtocolError::MissingProtocol(USB_PROTOCOL.to_string()))?;

        let raw_paths = props
            .get(PATHS)
            .or_else(|| props.get(LEGACY_PATH))
            .ok_or_else(|| ProtocolError::MissingProperty {
                protocol: USB_PROTOCOL.to_string(),
                property: PATHS.to_string(),
            })?;

        Ok(Self {
            paths: parse_paths(raw_paths)?,
            serial_number: optional_string(props, SERIAL_NUMBER)?,
            card_name: optional_string(props, CARD_NAME)?,
            auto_streaming: parse_bool(props, AUTO_STREAMING)?,
        })
    }

    /// Card name and serial number, if both are configured.
    pub fn identity(&self) -> Option<(&str, &str)> {
        match (&self.card_name, &self.serial_number) {
            (Some(card), Some(serial)) => Some((card.as_str(), serial.as_str())),
            _ => None,
        }
    }

    /// Plain path strings in order.
    pub fn path_strings(&self) -> Vec<String> {
        self.paths.iter().map(|p| p.path.clone()).collect()
    }

    /// Write these properties back in canonical form, dropping the legacy path key.
    pub fn write_into(&self, protocols: &mut Protocols) {
        let props = protocols.entry(USB_PROTOCOL.to_string()).or_default();
        props.remove(LEGACY_PATH);

        let paths = self
            .paths
            .iter()
            .map(|p| {
                let mut entry = Map::new();
                entry.insert(LEGACY_PATH.to_string(), Value::String(p.path.clone()));
                if let Some(desc) = &p.format_description {
                    entry.insert(FORMAT_DESCRIPTION.to_string(), Value::String(desc.clone()));
                }
                Value::Object(entry)
            })
            .collect();
        props.insert(PATHS.to_string(), Value::Array(paths));

        if let Some(serial) = &self.serial_number {
            props.insert(SERIAL_NUMBER.to_string(), Value::String(serial.clone()));
        }
        if let Some(card) = &self.card_name {
            props.insert(CARD_NAME.to_string(), Value::String(card.clone()));
        }
        props.insert(
            AUTO_STREAMING.to_string(),
            Value::String(self.auto_streaming.to_string()),
        );
    }
}

fn parse_paths(value: &Value) -> Result<Vec<DevicePath>, ProtocolError> {
    match value {
        Value::String(path) if path.is_empty() => Ok(Vec::new()),
        Value::String(path) => Ok(vec![DevicePath::new(path.clone())]),
        Value::Array(items) => items.iter().map(parse_path_entry).collect(),
        other => Err(ProtocolError::InvalidProperty {
            property: PATHS.to_string(),
            reason: format!("expected a string or a list, got {}", other),
        }),
    }
}

fn parse_path_entry(value: &Value) -> Result<DevicePath, ProtocolError> {
    match value {
        Value::String(path) => Ok(DevicePath::new(path.clone())),
        Value::Object(entry) => {
            let path = entry
                .get(LEGACY_PATH)
                .and_then(Value::as_str)
                .ok_or_else(|| ProtocolError::InvalidProperty {
                    property: PATHS.to_string(),
                    reason: format!("entry {} has no {} string", value, LEGACY_PATH),
                })?;
            Ok(DevicePath {
                path: path.to_string(),
                format_description: entry
                    .get(FORMAT_DESCRIPTION)
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        other => Err(ProtocolError::InvalidProperty {
            property: PATHS.to_string(),
            reason: format!("unsupported entry {}", other),
        }),
    }
}

fn optional_string(props: &Map<String, Value>, key: &str) -> Result<Option<String>, ProtocolError> {
    match props.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ProtocolError::InvalidProperty {
            property: key.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn parse_bool(props: &Map<String, Value>, key: &str) -> Result<bool, ProtocolError> {
    match props.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.is_empty() => Ok(false),
        Some(Value::String(s)) => {
            s.trim()
                .to_ascii_lowercase()
                .parse::<bool>()
                .map_err(|_| ProtocolError::InvalidProperty {
                    property: key.to_string(),
                    reason: format!("{:?} is not a boolean", s),
                })
        }
        Some(other) => Err(ProtocolError::InvalidProperty {
            property: key.to_string(),
            reason: format!("expected a boolean, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protocols(usb: Value) -> Protocols {
        let mut protocols = Protocols::new();
        if let Value::Object(map) = usb {
            protocols.insert(USB_PROTOCOL.to_string(), map);
        }
        protocols
    }

    #[test]
    fn test_paths_list_of_strings() {
        let p = protocols(json!({
            "Paths": ["/dev/video0", "/dev/video2", "/dev/video4"]
        }));
        let usb = UsbProtocol::from_protocols(&p).unwrap();
        assert_eq!(
            usb.path_strings(),
            vec!["/dev/video0", "/dev/video2", "/dev/video4"]
        );
        assert!(!usb.auto_streaming);
    }

    #[test]
    fn test_empty_paths_is_not_an_error() {
        let p = protocols(json!({ "Paths": [] }));
        let usb = UsbProtocol::from_protocols(&p).unwrap();
        assert!(usb.paths.is_empty());
    }

    #[test]
    fn test_missing_paths_is_an_error() {
        let p = protocols(json!({ "SerialNumber": "123" }));
        let err = UsbProtocol::from_protocols(&p).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingProperty { .. }));
    }

    #[test]
    fn test_missing_protocol_is_an_error() {
        let err = UsbProtocol::from_protocols(&Protocols::new()).unwrap_err();
        assert_eq!(err, ProtocolError::MissingProtocol("USB".to_string()));
    }

    #[test]
    fn test_legacy_single_path_is_migrated() {
        let p = protocols(json!({
            "Path": "/dev/video0",
            "SerialNumber": "61C0AE50",
            "CardName": "UVC Camera",
            "AutoStreaming": "true"
        }));
        let usb = UsbProtocol::from_protocols(&p).unwrap();
        assert_eq!(usb.paths, vec![DevicePath::new("/dev/video0")]);
        assert_eq!(usb.identity(), Some(("UVC Camera", "61C0AE50")));
        assert!(usb.auto_streaming);

        let mut written = p.clone();
        usb.write_into(&mut written);
        let block = &written[USB_PROTOCOL];
        assert!(block.get(LEGACY_PATH).is_none());
        assert_eq!(block[PATHS], json!([{ "Path": "/dev/video0" }]));
        assert_eq!(UsbProtocol::from_protocols(&written).unwrap(), usb);
    }

    #[test]
    fn test_structured_paths_keep_format_description() {
        let p = protocols(json!({
            "Paths": [
                { "Path": "/dev/video0", "FormatDescription": "Z16" },
                { "Path": "/dev/video4", "FormatDescription": "YUYV 4:2:2" }
            ],
            "AutoStreaming": false
        }));
        let usb = UsbProtocol::from_protocols(&p).unwrap();
        assert_eq!(usb.paths[0], DevicePath::with_format("/dev/video0", "Z16"));
        assert_eq!(usb.paths[1].format_description.as_deref(), Some("YUYV 4:2:2"));
    }

    #[test]
    fn test_invalid_auto_streaming_rejected() {
        let p = protocols(json!({ "Paths": [], "AutoStreaming": "maybe" }));
        let err = UsbProtocol::from_protocols(&p).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidProperty { .. }));
    }
}
