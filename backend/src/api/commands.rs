//! Command API handlers.
//!
//! Each request targets one resource of the device's profile. The query string
//! is passed on to the command as its raw query, so path selectors such as
//! `?PathIndex=1` or `?StreamFormat=Depth` work on both reads and writes.

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::debug;
use usbcam_types::api::{ErrorResponse, ReadCommandResponse};
use usbcam_types::CommandValue;

use crate::error::{DriverError, Result};
use crate::state::AppState;

/// Execute a read command.
#[utoipa::path(
    get,
    path = "/api/devices/{name}/commands/{resource}",
    tag = "commands",
    params(
        ("name" = String, Path, description = "Device name"),
        ("resource" = String, Path, description = "Resource name from the device profile")
    ),
    responses(
        (status = 200, description = "Command result", body = ReadCommandResponse),
        (status = 400, description = "Invalid command or query", body = ErrorResponse),
        (status = 404, description = "Device, resource or path not found", body = ErrorResponse),
        (status = 500, description = "Device access failed", body = ErrorResponse)
    )
)]
pub async fn read_command(
    State(state): State<AppState>,
    Path((name, resource)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Json<ReadCommandResponse>> {
    let manager = state.manager();
    debug!("Read {} from device {}", resource, name);

    let request = manager.command_request(&name, &resource, query.as_deref()).await?;
    let readings = manager.handle_read_commands(&name, vec![request]).await?;
    Ok(Json(ReadCommandResponse {
        device_name: name,
        readings,
    }))
}

/// Execute a write command with the JSON body as its parameter.
#[utoipa::path(
    put,
    path = "/api/devices/{name}/commands/{resource}",
    tag = "commands",
    params(
        ("name" = String, Path, description = "Device name"),
        ("resource" = String, Path, description = "Resource name from the device profile")
    ),
    request_body(content = serde_json::Value, description = "Command parameter"),
    responses(
        (status = 200, description = "Command executed"),
        (status = 400, description = "Invalid command, query or parameter", body = ErrorResponse),
        (status = 404, description = "Device, resource or path not found", body = ErrorResponse),
        (status = 409, description = "Streaming already in progress", body = ErrorResponse),
        (status = 502, description = "Setting not supported by the device", body = ErrorResponse)
    )
)]
pub async fn write_command(
    State(state): State<AppState>,
    Path((name, resource)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Result<StatusCode> {
    let manager = state.manager();
    debug!("Write {} on device {}", resource, name);

    let request = manager.command_request(&name, &resource, query.as_deref()).await?;
    let param = CommandValue::new(&request.resource_name, request.value_type, body)
        .map_err(|e| DriverError::contract(format!("failed to parse request body: {}", e)))?;
    manager
        .handle_write_commands(&name, vec![request], vec![param])
        .await?;
    Ok(StatusCode::OK)
}
