//! Discovery and path refresh API handlers.

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;
use usbcam_types::api::AcceptedResponse;
use usbcam_types::DiscoveredDevice;

use crate::state::AppState;

/// Devices found by the most recent discovery scan.
#[utoipa::path(
    get,
    path = "/api/discovery",
    tag = "discovery",
    responses(
        (status = 200, description = "Unregistered cameras", body = Vec<DiscoveredDevice>)
    )
)]
pub async fn last_scan(State(state): State<AppState>) -> Json<Vec<DiscoveredDevice>> {
    Json(state.discovery().last_scan().await)
}

/// Start a discovery scan in the background.
#[utoipa::path(
    post,
    path = "/api/discovery",
    tag = "discovery",
    responses(
        (status = 202, description = "Discovery started", body = AcceptedResponse)
    )
)]
pub async fn trigger_discovery(
    State(state): State<AppState>,
) -> (StatusCode, Json<AcceptedResponse>) {
    info!("Discovery triggered");
    state.discovery().trigger();
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "discovery started".to_string(),
        }),
    )
}

/// Re-resolve the paths of every active device in the background.
#[utoipa::path(
    post,
    path = "/api/refreshdevicepaths",
    tag = "discovery",
    responses(
        (status = 202, description = "Refresh started", body = AcceptedResponse)
    )
)]
pub async fn refresh_device_paths(
    State(state): State<AppState>,
) -> (StatusCode, Json<AcceptedResponse>) {
    info!("Device path refresh triggered");
    state.manager().refresh_all_in_background();
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "device path refresh started".to_string(),
        }),
    )
}
