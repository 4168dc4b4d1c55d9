//! API request and response types.

use crate::command::CommandValue;
use crate::protocol::Protocols;
use crate::registry::RegisteredDevice;
use crate::status::StreamingStatus;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Device API Types
// ============================================================================

/// Summary of one active device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceSummary {
    pub name: String,
    pub card_name: String,
    pub serial_number: String,
    pub paths: Vec<String>,
    pub auto_streaming: bool,
    /// Output URI without credentials.
    pub stream_uri: String,
    pub streaming_status: StreamingStatus,
}

/// Response containing a list of active devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceSummary>,
}

/// Response containing a single active device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceResponse {
    pub device: DeviceSummary,
}

/// Request to register and add a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AddDeviceRequest {
    pub device: RegisteredDevice,
}

/// Request to replace the protocol properties of a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UpdateDeviceRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub protocols: Protocols,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Response to a read command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ReadCommandResponse {
    pub device_name: String,
    pub readings: Vec<CommandValue>,
}

// ============================================================================
// Discovery API Types
// ============================================================================

/// A device found by a discovery scan that is not registered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DiscoveredDevice {
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub protocols: Protocols,
    pub description: String,
    pub labels: Vec<String>,
}

impl From<DiscoveredDevice> for RegisteredDevice {
    fn from(discovered: DiscoveredDevice) -> Self {
        let mut device = RegisteredDevice::new(discovered.name, discovered.protocols);
        device.description = discovered.description;
        device.labels = discovered.labels;
        device
    }
}

/// Response for an accepted background operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AcceptedResponse {
    pub message: String,
}

// ============================================================================
// RTSP Authentication Types
// ============================================================================

/// Authentication request sent by the streaming server for each client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RtspAuthRequest {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub query: String,
}

// ============================================================================
// Common Types
// ============================================================================

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
