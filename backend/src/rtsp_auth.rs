//! Credential gate called by the streaming server for every connecting client.

use crate::secrets::SecretStore;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use usbcam_types::RtspAuthRequest;

/// State of the credential gate.
#[derive(Clone)]
pub struct RtspAuth {
    secrets: Arc<dyn SecretStore>,
    secret_name: String,
}

impl RtspAuth {
    pub fn new(secrets: Arc<dyn SecretStore>, secret_name: impl Into<String>) -> Self {
        Self {
            secrets,
            secret_name: secret_name.into(),
        }
    }

    /// Decide whether `request` may access the stream.
    pub async fn authorize(&self, request: &RtspAuthRequest) -> StatusCode {
        // Clients probe without credentials first and retry after the 401.
        if request.user.is_empty() || request.password.is_empty() {
            debug!(
                "RTSP {} request from {} for {} without credentials",
                request.action, request.ip, request.path
            );
            return StatusCode::UNAUTHORIZED;
        }

        let stored = match self.secrets.credentials(&self.secret_name).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                error!(
                    "RTSP credentials are not configured under secret {}",
                    self.secret_name
                );
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
            Err(e) => {
                error!("Failed to read RTSP credentials: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };

        if stored.username != request.user || stored.password != request.password {
            warn!(
                "RTSP authentication failed for user {} from {} on {}",
                request.user, request.ip, request.path
            );
            return StatusCode::UNAUTHORIZED;
        }

        debug!("RTSP {} on {} authorized for {}", request.action, request.path, request.ip);
        StatusCode::OK
    }
}

async fn rtsp_auth(State(gate): State<RtspAuth>, Json(request): Json<RtspAuthRequest>) -> StatusCode {
    gate.authorize(&request).await
}

/// Router serving `POST /rtspauth`.
pub fn router(gate: RtspAuth) -> Router {
    Router::new()
        .route("/rtspauth", post(rtsp_auth))
        .with_state(gate)
}

/// Serve the credential gate on `addr` until `shutdown` resolves.
pub async fn serve(
    gate: RtspAuth,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("RTSP credential gate listening on {}", listener.local_addr()?);
    axum::serve(listener, router(gate))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
