//! Device registry records and device profiles.

use crate::command::{ValueType, COMMAND_ATTRIBUTE};
use crate::protocol::Protocols;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Name of the profile every USB camera uses unless configured otherwise.
pub const USB_CAMERA_PROFILE: &str = "USB-Camera-General";

/// Command names understood by the device manager.
pub mod commands {
    pub const METADATA_DEVICE_CAPABILITY: &str = "METADATA_DEVICE_CAPABILITY";
    pub const METADATA_CURRENT_VIDEO_INPUT: &str = "METADATA_CURRENT_VIDEO_INPUT";
    pub const METADATA_CAMERA_STATUS: &str = "METADATA_CAMERA_STATUS";
    pub const METADATA_DATA_FORMAT: &str = "METADATA_DATA_FORMAT";
    pub const METADATA_CROPPING_ABILITY: &str = "METADATA_CROPPING_ABILITY";
    pub const METADATA_STREAMING_PARAMETERS: &str = "METADATA_STREAMING_PARAMETERS";
    pub const METADATA_IMAGE_FORMATS: &str = "METADATA_IMAGE_FORMATS";
    pub const METADATA_FRAME_RATE_FORMATS: &str = "METADATA_FRAME_RATE_FORMATS";
    pub const VIDEO_GET_FRAME_RATE: &str = "VIDEO_GET_FRAME_RATE";
    pub const VIDEO_SET_FRAME_RATE: &str = "VIDEO_SET_FRAME_RATE";
    pub const VIDEO_GET_PIXEL_FORMAT: &str = "VIDEO_GET_PIXEL_FORMAT";
    pub const VIDEO_SET_PIXEL_FORMAT: &str = "VIDEO_SET_PIXEL_FORMAT";
    pub const VIDEO_STREAM_URI: &str = "VIDEO_STREAM_URI";
    pub const VIDEO_STREAMING_STATUS: &str = "VIDEO_STREAMING_STATUS";
    pub const VIDEO_START_STREAMING: &str = "VIDEO_START_STREAMING";
    pub const VIDEO_STOP_STREAMING: &str = "VIDEO_STOP_STREAMING";
}

/// A device as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RegisteredDevice {
    pub name: String,
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub protocols: Protocols,
}

fn default_profile_name() -> String {
    USB_CAMERA_PROFILE.to_string()
}

impl RegisteredDevice {
    pub fn new(name: impl Into<String>, protocols: Protocols) -> Self {
        Self {
            name: name.into(),
            profile_name: default_profile_name(),
            description: String::new(),
            labels: Vec::new(),
            protocols,
        }
    }
}

/// A readable/writable resource declared by a device profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceResource {
    pub name: String,
    pub value_type: ValueType,
    /// Resource attributes; `command` names the command, other keys are
    /// defaults such as `defaultOutputVideoCodec`.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: Map<String, Value>,
}

impl DeviceResource {
    pub fn new(name: &str, value_type: ValueType, command: &str) -> Self {
        let mut attributes = Map::new();
        attributes.insert(COMMAND_ATTRIBUTE.to_string(), Value::String(command.to_string()));
        Self {
            name: name.to_string(),
            value_type,
            attributes,
        }
    }
}

/// Set of resources shared by devices of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceProfile {
    pub name: String,
    pub resources: Vec<DeviceResource>,
}

impl DeviceProfile {
    pub fn resource(&self, name: &str) -> Option<&DeviceResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// First resource dispatching to `command`.
    pub fn resource_for_command(&self, command: &str) -> Option<&DeviceResource> {
        self.resources.iter().find(|r| {
            r.attributes.get(COMMAND_ATTRIBUTE).and_then(Value::as_str) == Some(command)
        })
    }

    /// Built-in profile for generic USB cameras.
    pub fn usb_camera() -> Self {
        use commands::*;

        let resources = [
            ("CameraInfo", ValueType::Object, METADATA_DEVICE_CAPABILITY),
            ("CurrentVideoInput", ValueType::Int32, METADATA_CURRENT_VIDEO_INPUT),
            ("CameraStatus", ValueType::Uint32, METADATA_CAMERA_STATUS),
            ("ImageFormats", ValueType::Object, METADATA_IMAGE_FORMATS),
            ("DataFormat", ValueType::Object, METADATA_DATA_FORMAT),
            ("CroppingAbility", ValueType::Object, METADATA_CROPPING_ABILITY),
            ("StreamingParameters", ValueType::Object, METADATA_STREAMING_PARAMETERS),
            ("FrameRateFormats", ValueType::Object, METADATA_FRAME_RATE_FORMATS),
            ("FrameRate", ValueType::Object, VIDEO_GET_FRAME_RATE),
            ("SetFrameRate", ValueType::Object, VIDEO_SET_FRAME_RATE),
            ("PixelFormat", ValueType::Object, VIDEO_GET_PIXEL_FORMAT),
            ("SetPixelFormat", ValueType::Object, VIDEO_SET_PIXEL_FORMAT),
            ("StreamURI", ValueType::String, VIDEO_STREAM_URI),
            ("StreamingStatus", ValueType::Object, VIDEO_STREAMING_STATUS),
            ("StartStreaming", ValueType::Object, VIDEO_START_STREAMING),
            ("StopStreaming", ValueType::Bool, VIDEO_STOP_STREAMING),
        ]
        .into_iter()
        .map(|(name, value_type, command)| DeviceResource::new(name, value_type, command))
        .collect();

        Self {
            name: USB_CAMERA_PROFILE.to_string(),
            resources,
        }
    }
}
