use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{ApplicationChanges, ApplicationDraft, RentalApplication, ReviewDecision};
use super::repository::{ApplicationRepository, ApplicationStatusView};
use super::service::{ApplicationService, ApplicationServiceError};
use crate::workflows::tenancy::domain::{ApplicationId, PropertyId};
use crate::workflows::tenancy::http::{
    actor_from_headers, internal_error, lifecycle_error_response, repository_error_response,
};
use crate::workflows::tenancy::store::Versioned;

/// Router builder exposing drafting, submission, and review endpoints.
pub fn application_router<R>(service: Arc<ApplicationService<R>>) -> Router
where
    R: ApplicationRepository + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(create_handler::<R>))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<R>).patch(update_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/submit",
            post(submit_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/review",
            post(review_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/decision",
            post(decision_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/withdraw",
            post(withdraw_handler::<R>),
        )
        .route(
            "/api/v1/properties/:property_id/applications",
            get(property_handler::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub comments: Option<String>,
}

impl IntoResponse for ApplicationServiceError {
    fn into_response(self) -> Response {
        match &self {
            ApplicationServiceError::Lifecycle(err) => lifecycle_error_response(err),
            ApplicationServiceError::Repository(err) => repository_error_response(err),
            ApplicationServiceError::Catalog(err) => internal_error(err),
            ApplicationServiceError::Events(err) => internal_error(err),
        }
    }
}

fn view_response(
    status: StatusCode,
    result: Result<Versioned<RentalApplication>, ApplicationServiceError>,
) -> Response {
    match result {
        Ok(stored) => (status, Json(ApplicationStatusView::from(&stored))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    headers: HeaderMap,
    Json(draft): Json<ApplicationDraft>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(StatusCode::CREATED, service.create_draft(&actor, draft))
}

pub(crate) async fn status_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::OK,
        service.get(&actor, &ApplicationId(application_id)),
    )
}

pub(crate) async fn update_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(changes): Json<ApplicationChanges>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::OK,
        service.update_draft(&actor, &ApplicationId(application_id), changes),
    )
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::ACCEPTED,
        service.submit(&actor, &ApplicationId(application_id)),
    )
}

pub(crate) async fn review_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::OK,
        service.begin_review(&actor, &ApplicationId(application_id)),
    )
}

pub(crate) async fn decision_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::OK,
        service.decide(
            &actor,
            &ApplicationId(application_id),
            request.decision,
            request.comments,
        ),
    )
}

pub(crate) async fn withdraw_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    view_response(
        StatusCode::OK,
        service.withdraw(&actor, &ApplicationId(application_id)),
    )
}

pub(crate) async fn property_handler<R>(
    State(service): State<Arc<ApplicationService<R>>>,
    Path(property_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.for_property(&actor, &PropertyId(property_id)) {
        Ok(records) => {
            let views: Vec<ApplicationStatusView> =
                records.iter().map(ApplicationStatusView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
