use crate::infra::{deserialize_optional_date, AppState};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use rentflow::workflows::tenancy::http::{actor_from_headers, lifecycle_error_response};
use rentflow::workflows::tenancy::{ActorId, InMemoryLifecycle, PropertyId};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SweepRequest {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PropertyRegistration {
    pub(crate) property_id: PropertyId,
    pub(crate) landlord_id: ActorId,
}

/// The engine routers plus the operational endpoints served next to them.
pub(crate) fn with_lifecycle_routes(lifecycle: &InMemoryLifecycle) -> Router {
    let operations = Router::new()
        .route("/api/v1/sweeps", post(sweep_endpoint))
        .route("/api/v1/properties", post(register_property_endpoint))
        .with_state(lifecycle.clone());

    lifecycle
        .router()
        .merge(operations)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Admin-triggered run of every sweep, defaulting to the clock's current date.
pub(crate) async fn sweep_endpoint(
    State(lifecycle): State<InMemoryLifecycle>,
    headers: HeaderMap,
    body: Option<Json<SweepRequest>>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if !actor.is_admin() {
        return lifecycle_error_response(&actor.deny("run sweeps"));
    }

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let as_of = request.as_of.unwrap_or_else(|| lifecycle.clock.today());
    info!(actor = %actor.id, %as_of, "manual sweep requested");
    let summary = lifecycle.run_sweeps(as_of);
    crate::infra::log_sweep(&summary);
    (StatusCode::OK, Json(summary)).into_response()
}

pub(crate) async fn register_property_endpoint(
    State(lifecycle): State<InMemoryLifecycle>,
    headers: HeaderMap,
    Json(registration): Json<PropertyRegistration>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if !actor.is_admin() {
        return lifecycle_error_response(&actor.deny("register properties"));
    }

    info!(
        property_id = %registration.property_id,
        landlord_id = %registration.landlord_id,
        "property registered"
    );
    lifecycle
        .catalog
        .register(registration.property_id.clone(), registration.landlord_id.clone());
    (
        StatusCode::CREATED,
        Json(json!({
            "property_id": registration.property_id,
            "landlord_id": registration.landlord_id,
        })),
    )
        .into_response()
}
