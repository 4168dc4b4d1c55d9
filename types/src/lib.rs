//! Shared types for the USB camera device service.
//!
//! This crate contains the registry records, protocol properties, command
//! values and API types shared between the service and its clients.

/// Default port for the device service API.
pub const DEFAULT_PORT: u16 = 59983;

pub mod api;
pub mod command;
pub mod events;
pub mod metadata;
pub mod protocol;
pub mod registry;
pub mod status;

// Re-export commonly used types
pub use api::{DiscoveredDevice, ErrorResponse, RtspAuthRequest};
pub use command::{CommandRequest, CommandValue, ValueType};
pub use events::DeviceEvent;
pub use protocol::{DevicePath, ProtocolError, Protocols, UsbProtocol, USB_PROTOCOL};
pub use registry::{DeviceProfile, DeviceResource, RegisteredDevice};
pub use status::StreamingStatus;
