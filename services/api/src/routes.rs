use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use caisse_imprevue::workflows::caisse::{
    contract_router, demand_router, CaisseRepository, ContractService, DemandService,
    EventPublisher, SubscriptionTier,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) fn with_caisse_routes<R, P>(
    demands: Arc<DemandService<R, P>>,
    contracts: Arc<ContractService<R, P>>,
) -> Router
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    demand_router(demands)
        .merge(contract_router(contracts))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/caisse/tiers", get(tiers_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Relaxed) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Forfaits currently offered, in code order.
pub(crate) async fn tiers_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<Vec<SubscriptionTier>> {
    Json(state.catalog.tiers().cloned().collect())
}
