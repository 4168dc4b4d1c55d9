//! USB camera device service.
//!
//! This module exposes the application builder for use in tests.

use axum::http::HeaderValue;
use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod api;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod manager;
pub mod openapi;
pub mod paths;
pub mod publisher;
pub mod registry;
pub mod rtsp_auth;
pub mod secrets;
pub mod state;
pub mod transcoder;
pub mod usb;
pub mod version;

use state::AppState;

/// Create the Axum application router.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    create_app_with_config(state, Vec::new())
}

/// Create the Axum application router with a given state and CORS origins.
///
/// If `cors_allowed_origins` is empty, any origin is allowed.
/// Otherwise, only the specified origins are allowed.
pub fn create_app_with_config(state: AppState, cors_allowed_origins: Vec<String>) -> Router {
    let api_router = Router::new()
        .route(
            "/devices",
            get(api::devices::list_devices).post(api::devices::add_device),
        )
        .route(
            "/devices/{name}",
            get(api::devices::get_device)
                .put(api::devices::update_device)
                .delete(api::devices::delete_device),
        )
        .route(
            "/devices/{name}/commands/{resource}",
            get(api::commands::read_command).put(api::commands::write_command),
        )
        .route(
            "/discovery",
            get(api::discovery::last_scan).post(api::discovery::trigger_discovery),
        )
        .route(
            "/refreshdevicepaths",
            post(api::discovery::refresh_device_paths),
        )
        .route("/events", get(api::events::events_stream))
        .route("/version", get(api::version::get_version));

    let swagger_router = Router::new().merge(
        SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
    );

    Router::new()
        .route("/health", get(health))
        .merge(swagger_router)
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

            if cors_allowed_origins.is_empty() {
                cors.allow_origin(Any)
            } else {
                let origins: Vec<HeaderValue> = cors_allowed_origins
                    .iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            }
        })
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
