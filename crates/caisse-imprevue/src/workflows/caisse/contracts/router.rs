use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::super::demands::router::actor_from;
use super::super::domain::{ActorId, ContractId, SupportId};
use super::super::error::CaisseError;
use super::super::events::EventPublisher;
use super::super::repository::CaisseRepository;
use super::super::support::OffsetAuthorization;
use super::service::ContractService;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DueMonthQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub first_payment_date: NaiveDate,
    #[serde(default)]
    pub signed_contract_document_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub period_date: NaiveDate,
    #[serde(default)]
    pub paid_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyRequest {
    pub period_index: u32,
    pub amount: u64,
    #[serde(default)]
    pub assessed_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    #[serde(default)]
    pub settled_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRequest {
    pub amount: u64,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedSettlementRequest {
    pub authorized_by: ActorId,
    pub reference: String,
    #[serde(default)]
    pub settled_at: Option<NaiveDate>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, CaisseError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Router builder exposing contract lifecycle and support endpoints.
pub fn contract_router<R, P>(service: Arc<ContractService<R, P>>) -> Router
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/api/v1/caisse/overdue", get(scan_overdue_handler::<R, P>))
        .route(
            "/api/v1/caisse/contracts/:contract_id",
            get(get_handler::<R, P>).delete(delete_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/activate",
            post(activate_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/payments",
            post(payment_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/complete",
            post(complete_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/penalties",
            post(assess_penalty_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/penalties/:period_index/settle",
            post(settle_penalty_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/cancel",
            post(cancel_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/documents/final-refund",
            put(final_document_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/documents/early-refund",
            put(early_document_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/overdue",
            get(overdue_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/due",
            get(due_in_month_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/support-eligibility",
            get(eligibility_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/supports",
            post(grant_support_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/support-overdue",
            get(support_overdue_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/supports/:support_id/repay",
            post(repay_support_handler::<R, P>),
        )
        .route(
            "/api/v1/caisse/contracts/:contract_id/supports/:support_id/force-settle",
            post(force_settle_handler::<R, P>),
        )
        .with_state(service)
}

pub(crate) async fn get_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.get(&ContractId(contract_id)))
}

pub(crate) async fn activate_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<ActivationRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.activate(
        &ContractId(contract_id),
        request.first_payment_date,
        request.signed_contract_document_id,
    );
    respond(StatusCode::OK, result)
}

pub(crate) async fn payment_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<PaymentRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let paid_at = request.paid_at.unwrap_or_else(today);
    let result = service.record_payment(&ContractId(contract_id), request.period_date, paid_at);
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn complete_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    respond(StatusCode::OK, service.try_complete(&ContractId(contract_id)))
}

pub(crate) async fn assess_penalty_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<PenaltyRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.assess_penalty(
        &ContractId(contract_id),
        request.period_index,
        request.amount,
        &actor_from(&headers),
        request.assessed_at.unwrap_or_else(today),
    );
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn settle_penalty_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path((contract_id, period_index)): Path<(String, u32)>,
    axum::Json(request): axum::Json<SettlementRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service.settle_penalty(
        &ContractId(contract_id),
        period_index,
        request.settled_at.unwrap_or_else(today),
    );
    respond(StatusCode::OK, result)
}

pub(crate) async fn cancel_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<CancelRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.cancel(&ContractId(contract_id), &request.reason),
    )
}

pub(crate) async fn delete_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    match service.delete(&ContractId(contract_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn final_document_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<DocumentRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result =
        service.attach_final_refund_document(&ContractId(contract_id), request.document_id);
    respond(StatusCode::OK, result)
}

pub(crate) async fn early_document_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<DocumentRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result =
        service.attach_early_refund_document(&ContractId(contract_id), request.document_id);
    respond(StatusCode::OK, result)
}

pub(crate) async fn overdue_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let today = query.as_of.unwrap_or_else(today);
    let result = service
        .overdue_status(&ContractId(contract_id), today)
        .map(|status| json!({ "overdue": status.is_some(), "status": status }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn due_in_month_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    Query(query): Query<DueMonthQuery>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let result = service
        .is_due_in_month(&ContractId(contract_id), query.year, query.month)
        .map(|due| json!({ "year": query.year, "month": query.month, "due": due }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn scan_overdue_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Query(query): Query<AsOfQuery>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let today = query.as_of.unwrap_or_else(today);
    let result = service.scan_overdue(today).map(|overdue| {
        overdue
            .into_iter()
            .map(|(contract_id, status)| json!({ "contractId": contract_id, "status": status }))
            .collect::<Vec<_>>()
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn eligibility_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let as_of = query.as_of.unwrap_or_else(today);
    respond(
        StatusCode::OK,
        service.support_eligibility(&ContractId(contract_id), as_of),
    )
}

pub(crate) async fn grant_support_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    axum::Json(request): axum::Json<SupportRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let as_of = request.as_of.unwrap_or_else(today);
    respond(
        StatusCode::CREATED,
        service.grant_support(&ContractId(contract_id), request.amount, as_of),
    )
}

pub(crate) async fn support_overdue_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path(contract_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let as_of = query.as_of.unwrap_or_else(today);
    let result = match service.check_support_overdue(&ContractId(contract_id), as_of) {
        Ok(()) => Ok(json!({ "overdue": false })),
        Err(error @ CaisseError::OverdueSupport { .. }) => Ok(json!({
            "overdue": true,
            "error": error.to_string(),
        })),
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn repay_support_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path((contract_id, support_id)): Path<(String, String)>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SettlementRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let actor = actor_from(&headers);
    let result = service.repay_support(
        &ContractId(contract_id),
        &SupportId(support_id),
        request.settled_at.unwrap_or_else(today),
        Some(&actor),
    );
    respond(StatusCode::OK, result)
}

pub(crate) async fn force_settle_handler<R, P>(
    State(service): State<Arc<ContractService<R, P>>>,
    Path((contract_id, support_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ForcedSettlementRequest>,
) -> Response
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    let authorization = OffsetAuthorization {
        authorized_by: request.authorized_by,
        reference: request.reference,
    };
    let result = service.force_settle_support(
        &ContractId(contract_id),
        &SupportId(support_id),
        &authorization,
        request.settled_at.unwrap_or_else(today),
    );
    respond(StatusCode::OK, result)
}
