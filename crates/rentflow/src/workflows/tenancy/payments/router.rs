use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{EntryView, PaymentReceipt};
use super::repository::PaymentRepository;
use super::service::{PaymentScheduleService, PaymentServiceError};
use crate::workflows::tenancy::domain::{EntryId, LeaseId};
use crate::workflows::tenancy::http::{
    actor_from_headers, internal_error, lifecycle_error_response, repository_error_response,
};

/// Router builder exposing schedule reads and settlement endpoints.
pub fn payment_router<P>(service: Arc<PaymentScheduleService<P>>) -> Router
where
    P: PaymentRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/payments/leases/:lease_id/entries",
            get(entries_handler::<P>),
        )
        .route(
            "/api/v1/payments/leases/:lease_id/summary",
            get(summary_handler::<P>),
        )
        .route("/api/v1/payments/entries/:entry_id", get(entry_handler::<P>))
        .route(
            "/api/v1/payments/entries/:entry_id/payments",
            post(record_handler::<P>),
        )
        .route(
            "/api/v1/payments/entries/:entry_id/waive",
            post(waive_handler::<P>),
        )
        .route(
            "/api/v1/payments/entries/:entry_id/refund",
            post(refund_handler::<P>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct WaiveRequest {
    pub reason: String,
}

impl IntoResponse for PaymentServiceError {
    fn into_response(self) -> Response {
        match &self {
            PaymentServiceError::Lifecycle(err) => lifecycle_error_response(err),
            PaymentServiceError::Repository(err) => repository_error_response(err),
            PaymentServiceError::Events(err) => internal_error(err),
        }
    }
}

pub(crate) async fn entries_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.entries(&actor, &LeaseId(lease_id)) {
        Ok(entries) => {
            let views: Vec<EntryView> = entries
                .iter()
                .map(|entry| EntryView::new(&entry.record, entry.revision))
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn summary_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(lease_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.summary(&actor, &LeaseId(lease_id)) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn entry_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.entry(&actor, &EntryId(entry_id)) {
        Ok(entry) => (
            StatusCode::OK,
            Json(EntryView::new(&entry.record, entry.revision)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn record_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
    Json(receipt): Json<PaymentReceipt>,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.record_payment(&actor, &EntryId(entry_id), receipt) {
        Ok(entry) => (
            StatusCode::OK,
            Json(EntryView::new(&entry.record, entry.revision)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn waive_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<WaiveRequest>,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.waive_payment(&actor, &EntryId(entry_id), request.reason) {
        Ok(entry) => (
            StatusCode::OK,
            Json(EntryView::new(&entry.record, entry.revision)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn refund_handler<P>(
    State(service): State<Arc<PaymentScheduleService<P>>>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
    Json(receipt): Json<PaymentReceipt>,
) -> Response
where
    P: PaymentRepository + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.refund_payment(&actor, &EntryId(entry_id), receipt) {
        Ok(entry) => (
            StatusCode::OK,
            Json(EntryView::new(&entry.record, entry.revision)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
