//! Process-level failures surfaced by startup and the CLI.

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::tenancy::applications::ApplicationServiceError;
use crate::workflows::tenancy::leases::LeaseServiceError;
use crate::workflows::tenancy::payments::PaymentServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    /// A lifecycle operation driven from the CLI failed.
    Lifecycle(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Lifecycle(message) => write!(f, "lifecycle error: {}", message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Lifecycle(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Lifecycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ApplicationServiceError> for AppError {
    fn from(value: ApplicationServiceError) -> Self {
        Self::Lifecycle(value.to_string())
    }
}

impl From<LeaseServiceError> for AppError {
    fn from(value: LeaseServiceError) -> Self {
        Self::Lifecycle(value.to_string())
    }
}

impl From<PaymentServiceError> for AppError {
    fn from(value: PaymentServiceError) -> Self {
        Self::Lifecycle(value.to_string())
    }
}
