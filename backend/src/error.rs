//! Error taxonomy of the device service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use usbcam_types::ErrorResponse;

pub type Result<T> = std::result::Result<T, DriverError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Category of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ContractInvalid,
    NotFound,
    Conflict,
    Communication,
    Server,
    AlreadyStreaming,
}

/// Errors surfaced by the device manager and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Malformed or missing command, query parameter or option.
    #[error("{0}")]
    ContractInvalid(String),

    #[error("{0}")]
    NotFound(String),

    /// Identity or name collision.
    #[error("{0}")]
    Conflict(String),

    /// The device refused or does not support the requested setting.
    #[error("{0}")]
    Communication(String),

    #[error("{message}")]
    Server {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("video streaming is already in progress for device {0}")]
    AlreadyStreaming(String),
}

impl DriverError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractInvalid(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            source: None,
        }
    }

    /// Server error wrapping a lower level cause.
    pub fn server_with(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Server {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error raised while executing `command`.
    pub fn command(command: &str, source: impl std::fmt::Display) -> Self {
        Self::server(format!("failed to execute {} command: {}", command, source))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContractInvalid(_) => ErrorKind::ContractInvalid,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Communication(_) => ErrorKind::Communication,
            Self::Server { .. } => ErrorKind::Server,
            Self::AlreadyStreaming(_) => ErrorKind::AlreadyStreaming,
        }
    }

    /// Message including the chain of causes.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::ContractInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::AlreadyStreaming => StatusCode::CONFLICT,
            ErrorKind::Communication => StatusCode::BAD_GATEWAY,
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<usbcam_types::ProtocolError> for DriverError {
    fn from(err: usbcam_types::ProtocolError) -> Self {
        Self::ContractInvalid(err.to_string())
    }
}

impl IntoResponse for DriverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match std::error::Error::source(&self) {
            Some(cause) => ErrorResponse::with_details(self.to_string(), cause.to_string()),
            None => ErrorResponse::new(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DriverError::contract("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DriverError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DriverError::AlreadyStreaming("cam".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            DriverError::Communication("unsupported".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DriverError::server("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detailed_message_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = DriverError::server_with("failed to open /dev/video9", io);
        assert_eq!(
            err.detailed_message(),
            "failed to open /dev/video9: no such file"
        );
        assert_eq!(err.kind(), ErrorKind::Server);
    }
}
