//! OpenAPI documentation configuration.

use crate::version::VersionInfo;
use usbcam_types::api::{
    AcceptedResponse, AddDeviceRequest, DeviceListResponse, DeviceResponse, DeviceSummary,
    DiscoveredDevice, ErrorResponse, ReadCommandResponse, UpdateDeviceRequest,
};
use usbcam_types::{CommandValue, RegisteredDevice, StreamingStatus, ValueType};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::devices::list_devices,
        crate::api::devices::get_device,
        crate::api::devices::add_device,
        crate::api::devices::update_device,
        crate::api::devices::delete_device,
        crate::api::commands::read_command,
        crate::api::commands::write_command,
        crate::api::discovery::last_scan,
        crate::api::discovery::trigger_discovery,
        crate::api::discovery::refresh_device_paths,
        crate::api::version::get_version,
    ),
    components(
        schemas(
            DeviceSummary,
            DeviceListResponse,
            DeviceResponse,
            AddDeviceRequest,
            UpdateDeviceRequest,
            RegisteredDevice,
            ReadCommandResponse,
            CommandValue,
            ValueType,
            StreamingStatus,
            DiscoveredDevice,
            AcceptedResponse,
            ErrorResponse,
            VersionInfo,
        )
    ),
    tags(
        (name = "devices", description = "Device registration and lifecycle"),
        (name = "commands", description = "Device read and write commands"),
        (name = "discovery", description = "Camera discovery and path refresh"),
        (name = "System", description = "System information endpoints")
    ),
    info(
        title = "USB Camera Device Service API",
        version = "0.1.0",
        description = "REST API for managing USB cameras and their RTSP streams",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;
