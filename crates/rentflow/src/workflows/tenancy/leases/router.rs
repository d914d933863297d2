use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{CreateLease, LeaseTerms, TerminateLease};
use super::repository::{LeaseRepository, LeaseStatusView};
use super::service::{LeaseService, LeaseServiceError};
use crate::workflows::tenancy::applications::ApplicationRepository;
use crate::workflows::tenancy::domain::LeaseId;
use crate::workflows::tenancy::http::{
    actor_from_headers, internal_error, lifecycle_error_response, repository_error_response,
};

/// Router builder exposing lease formation, termination, and renewal.
pub fn lease_router<L, A>(service: Arc<LeaseService<L, A>>) -> Router
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    Router::new()
        .route("/api/v1/leases", post(create_handler::<L, A>))
        .route("/api/v1/leases/:lease_id", get(status_handler::<L, A>))
        .route(
            "/api/v1/leases/:lease_id/signatures",
            post(sign_handler::<L, A>),
        )
        .route(
            "/api/v1/leases/:lease_id/terminate",
            post(terminate_handler::<L, A>),
        )
        .route(
            "/api/v1/leases/:lease_id/renewals",
            post(renew_handler::<L, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignRequest {
    pub signature_ref: String,
}

impl IntoResponse for LeaseServiceError {
    fn into_response(self) -> Response {
        match &self {
            LeaseServiceError::Lifecycle(err) => lifecycle_error_response(err),
            LeaseServiceError::Repository(err) => repository_error_response(err),
            LeaseServiceError::Catalog(err) => internal_error(err),
            LeaseServiceError::Events(err) => internal_error(err),
        }
    }
}

pub(crate) async fn create_handler<L, A>(
    State(service): State<Arc<LeaseService<L, A>>>,
    headers: HeaderMap,
    Json(request): Json<CreateLease>,
) -> Response
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.create(&actor, request) {
        Ok(lease) => (StatusCode::CREATED, Json(LeaseStatusView::from(&lease))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<L, A>(
    State(service): State<Arc<LeaseService<L, A>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.get(&actor, &LeaseId(lease_id)) {
        Ok(lease) => (StatusCode::OK, Json(LeaseStatusView::from(&lease))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn sign_handler<L, A>(
    State(service): State<Arc<LeaseService<L, A>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SignRequest>,
) -> Response
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.sign(&actor, &LeaseId(lease_id), request.signature_ref) {
        Ok(lease) => (StatusCode::OK, Json(LeaseStatusView::from(&lease))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn terminate_handler<L, A>(
    State(service): State<Arc<LeaseService<L, A>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TerminateLease>,
) -> Response
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.terminate(&actor, &LeaseId(lease_id), request) {
        Ok(lease) => (StatusCode::OK, Json(LeaseStatusView::from(&lease))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn renew_handler<L, A>(
    State(service): State<Arc<LeaseService<L, A>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
    Json(terms): Json<LeaseTerms>,
) -> Response
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.renew(&actor, &LeaseId(lease_id), terms) {
        Ok(lease) => (StatusCode::CREATED, Json(LeaseStatusView::from(&lease))).into_response(),
        Err(err) => err.into_response(),
    }
}
