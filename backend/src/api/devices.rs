//! Device API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};
use usbcam_types::api::{
    AddDeviceRequest, DeviceListResponse, DeviceResponse, ErrorResponse, UpdateDeviceRequest,
};

use crate::error::{DriverError, Result};
use crate::registry::RegistryError;
use crate::state::AppState;

/// List active devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    responses(
        (status = 200, description = "Active devices", body = DeviceListResponse)
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> Json<DeviceListResponse> {
    let manager = state.manager();
    let mut devices = Vec::new();
    for device in manager.devices().await {
        devices.push(manager.summary(&device).await);
    }
    Json(DeviceListResponse { devices })
}

/// Get an active device by name.
#[utoipa::path(
    get,
    path = "/api/devices/{name}",
    tag = "devices",
    params(
        ("name" = String, Path, description = "Device name")
    ),
    responses(
        (status = 200, description = "Device found", body = DeviceResponse),
        (status = 404, description = "Device not found", body = ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeviceResponse>> {
    let manager = state.manager();
    let device = manager.device(&name).await?;
    Ok(Json(DeviceResponse {
        device: manager.summary(&device).await,
    }))
}

/// Register a device and make it active.
///
/// The registration is kept when activation fails, so the device can be
/// corrected with an update.
#[utoipa::path(
    post,
    path = "/api/devices",
    tag = "devices",
    request_body = AddDeviceRequest,
    responses(
        (status = 201, description = "Device added", body = DeviceResponse),
        (status = 400, description = "Invalid protocol properties", body = ErrorResponse),
        (status = 409, description = "Name or serial number already in use", body = ErrorResponse),
        (status = 500, description = "Device could not be activated", body = ErrorResponse)
    )
)]
pub async fn add_device(
    State(state): State<AppState>,
    Json(req): Json<AddDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceResponse>)> {
    let manager = state.manager();
    let name = req.device.name.clone();
    info!("Received add device request: name='{}'", name);

    match manager.registry().device(&name).await {
        Ok(_) => {
            return Err(DriverError::Conflict(format!(
                "device {} is already registered",
                name
            )))
        }
        Err(RegistryError::DeviceNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    manager.registry().upsert_device(&req.device).await?;
    manager.add_device(&name, &req.device.protocols).await?;

    let device = manager.device(&name).await?;
    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            device: manager.summary(&device).await,
        }),
    ))
}

/// Replace the protocol properties of a registered device.
#[utoipa::path(
    put,
    path = "/api/devices/{name}",
    tag = "devices",
    params(
        ("name" = String, Path, description = "Device name")
    ),
    request_body = UpdateDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 404, description = "Device not registered", body = ErrorResponse)
    )
)]
pub async fn update_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<Json<DeviceResponse>> {
    let manager = state.manager();
    info!("Received update device request: name='{}'", name);

    let mut registered = manager.registry().device(&name).await?;
    registered.protocols = req.protocols;
    if let Some(description) = req.description {
        registered.description = description;
    }
    if let Some(labels) = req.labels {
        registered.labels = labels;
    }
    manager.registry().upsert_device(&registered).await?;
    manager.update_device(&name, &registered.protocols).await?;

    let device = manager.device(&name).await?;
    Ok(Json(DeviceResponse {
        device: manager.summary(&device).await,
    }))
}

/// Stop and remove a device, and delete its registration.
#[utoipa::path(
    delete,
    path = "/api/devices/{name}",
    tag = "devices",
    params(
        ("name" = String, Path, description = "Device name")
    ),
    responses(
        (status = 204, description = "Device removed"),
        (status = 404, description = "Device not registered", body = ErrorResponse)
    )
)]
pub async fn delete_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    let manager = state.manager();
    info!("Received delete device request: name='{}'", name);

    manager.remove_device(&name).await;
    match manager.registry().delete_device(&name).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(RegistryError::DeviceNotFound(_)) => {
            warn!("Device {} was not registered", name);
            Err(DriverError::not_found(format!("device {} not found", name)))
        }
        Err(e) => Err(e.into()),
    }
}
