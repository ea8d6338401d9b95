use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use super::super::domain::{
    ActorId, DeletionConfirmation, DemandId, DemandSubmission, EmergencyContact,
};
use super::super::events::EventPublisher;
use super::super::repository::CaisseRepository;
use super::service::DemandService;

/// Header carrying the back-office user performing the request.
pub const ACTOR_HEADER: &str = "x-caisse-actor";

const DEFAULT_ACTOR: &str = "system";

/// Body shared by approve, reject and reopen.
#[derive(Debug, Clone, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Router builder exposing the demand workflow over HTTP.
pub fn demand_router<R, P>(service: Arc<DemandService<R, P>>) -> Router
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/api/v1/caisse/demands", post(submit_handler::<R, P>))
        .route(
            "/api/v1/caisse/demands/:demand_id",
            get(get_handler::<R, P>).delete(delete_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/demands/:demand_id/approve",
            post(approve_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/demands/:demand_id/reject",
            post(reject_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/demands/:demand_id/reopen",
            post(reopen_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/demands/:demand_id/emergency-contact",
            put(emergency_contact_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/demands/:demand_id/convert",
            post(convert_handler::<R, P>),
        )
        .with_state(service)
}

pub(crate) fn actor_from(headers: &HeaderMap) -> ActorId {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| ActorId::from(DEFAULT_ACTOR), ActorId::from)
}

pub(crate) async fn submit_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<DemandSubmission>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.submit(submission, &actor_from(&headers)) {
        Ok(stored) => (StatusCode::CREATED, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.get(&DemandId(demand_id)) {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn approve_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.approve(&DemandId(demand_id), &request.reason, &actor_from(&headers));
    match result {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn reject_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.reject(&DemandId(demand_id), &request.reason, &actor_from(&headers));
    match result {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn reopen_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReasonRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.reopen(&DemandId(demand_id), &request.reason, &actor_from(&headers));
    match result {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn emergency_contact_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
    axum::Json(contact): axum::Json<EmergencyContact>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.update_emergency_contact(&DemandId(demand_id), contact) {
        Ok(stored) => (StatusCode::OK, axum::Json(stored)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn convert_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.convert(&DemandId(demand_id)) {
        Ok(contract) => (StatusCode::CREATED, axum::Json(contract)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn delete_handler<R, P>(
    State(service): State<Arc<DemandService<R, P>>>,
    Path(demand_id): Path<String>,
    axum::Json(confirmation): axum::Json<DeletionConfirmation>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.delete(&DemandId(demand_id), &confirmation) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}
