//! # Error Handling Module
//!
//! This module defines every error the blue-green subsystem can produce, using the
//! `thiserror` crate, together with the HTTP status code each one maps to when it is
//! surfaced through the manager control API.
//!
//! ## Where errors stop
//!
//! Errors are split into three families and each family has a hard boundary:
//! - **Lifecycle errors** (spawn failure, health check timeout, stop failure) are produced
//!   inside [`crate::deployment::manager::BlueGreenManager`], logged where they happen, and
//!   returned as `Err` values. They never panic and never leave a color marked healthy
//!   without a passing probe.
//! - **Proxy errors** never become a `GatewayError` at all. The traffic router maps them
//!   directly to literal `502`/`503` responses.
//! - **Observability errors** (persisting a metrics snapshot) are logged and dropped.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::core::types::Color;

/// Main result type used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the lifecycle manager, state store and configuration layer
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display` with the
/// given message.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The deployment state file could not be read, parsed or written
    #[error("Deployment state error: {message}")]
    State { message: String },

    /// The backend process for a color could not be spawned
    #[error("Failed to spawn {color} instance: {reason}")]
    Spawn { color: Color, reason: String },

    /// A freshly started instance never answered its health endpoint with 200
    #[error("{color} instance failed health check after {attempts} attempts")]
    HealthCheckFailed { color: Color, attempts: u32 },

    /// A traffic switch was refused because the target is not healthy right now
    #[error("{color} instance is not healthy")]
    Unhealthy { color: Color },

    /// A color already owns a live process
    #[error("{color} instance is already running with pid {pid}")]
    AlreadyRunning { color: Color, pid: u32 },

    /// The process group of a color could not be signalled
    #[error("Failed to stop {color} instance: {reason}")]
    Stop { color: Color, reason: String },

    /// Internal errors for unexpected failures
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, process handling, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// HTTP client errors
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a state error with a custom message
    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a spawn error for a color
    pub fn spawn<S: Into<String>>(color: Color, reason: S) -> Self {
        Self::Spawn {
            color,
            reason: reason.into(),
        }
    }

    /// Create a stop error for a color
    pub fn stop<S: Into<String>>(color: Color, reason: S) -> Self {
        Self::Stop {
            color,
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code used when this error reaches the control API
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unhealthy { .. } => StatusCode::CONFLICT,
            Self::AlreadyRunning { .. } => StatusCode::CONFLICT,
            Self::HealthCheckFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Spawn { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Stop { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::State { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::State { .. } => "state_error",
            Self::Spawn { .. } => "spawn_error",
            Self::HealthCheckFailed { .. } => "health_check_failed",
            Self::Unhealthy { .. } => "unhealthy_target",
            Self::AlreadyRunning { .. } => "already_running",
            Self::Stop { .. } => "stop_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::HttpClient { .. } => "http_client_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

/// Render errors as structured JSON so the control API reports why an operation failed
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::Unhealthy { color: Color::Green }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GatewayError::HealthCheckFailed {
                color: Color::Blue,
                attempts: 30
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::config("bad port").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_messages_name_the_color() {
        let err = GatewayError::spawn(Color::Green, "no such file");
        assert_eq!(err.to_string(), "Failed to spawn green instance: no such file");

        let err = GatewayError::AlreadyRunning {
            color: Color::Blue,
            pid: 42,
        };
        assert_eq!(err.to_string(), "blue instance is already running with pid 42");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GatewayError = io.into();
        assert_eq!(err.error_type(), "io_error");
    }
}
