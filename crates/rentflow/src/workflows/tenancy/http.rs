//! HTTP plumbing shared by the engine routers.

use std::fmt::Display;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use super::domain::{Actor, ActorRole, LifecycleError};
use super::store::RepositoryError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Reads the pre-authenticated caller from the gateway headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(ActorRole::parse);

    match (id, role) {
        (Some(id), Some(role)) => Ok(Actor::new(id, role)),
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            format!("{ACTOR_ID_HEADER} and {ACTOR_ROLE_HEADER} headers are required"),
        )),
    }
}

pub fn lifecycle_error_response(err: &LifecycleError) -> Response {
    let (status, kind) = match err {
        LifecycleError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        LifecycleError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        LifecycleError::ConflictingActiveLease { .. } => {
            (StatusCode::CONFLICT, "conflicting_active_lease")
        }
        LifecycleError::NotAuthorized { .. } => (StatusCode::FORBIDDEN, "not_authorized"),
        LifecycleError::ConcurrencyConflict { .. } => {
            (StatusCode::CONFLICT, "concurrency_conflict")
        }
        LifecycleError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
    };

    let mut payload = json!({
        "error": err.to_string(),
        "kind": kind,
    });
    if let LifecycleError::Validation { field, .. } = err {
        payload["field"] = json!(field);
    }
    if err.is_retryable() {
        payload["retryable"] = json!(true);
    }
    (status, Json(payload)).into_response()
}

pub fn repository_error_response(err: &RepositoryError) -> Response {
    match err {
        RepositoryError::NotFound => error_response(StatusCode::NOT_FOUND, err.to_string()),
        RepositoryError::Conflict | RepositoryError::ActivePropertyLease { .. } => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        RepositoryError::StaleRevision { .. } => {
            let payload = json!({
                "error": err.to_string(),
                "retryable": true,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RepositoryError::Unavailable(_) => internal_error(err),
    }
}

pub fn internal_error(err: impl Display) -> Response {
    error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}
