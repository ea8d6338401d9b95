use super::common::*;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::caisse::contracts::contract_router;
use crate::workflows::caisse::demands::{demand_router, DemandService, ACTOR_HEADER};
use crate::workflows::caisse::policy::CaissePolicy;

fn router(harness: &Harness) -> Router {
    demand_router(harness.demands.clone()).merge(contract_router(harness.contracts.clone()))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, "agent-guichet-02");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serializable")))
            .expect("valid request"),
        None => builder.body(Body::empty()).expect("valid request"),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, Value::Null);
    }
    (status, json_body(response).await)
}

async fn submitted_demand_id(router: &Router) -> String {
    let body = serde_json::to_value(submission("C")).expect("serializable");
    let (status, body) = send(
        router,
        request(Method::POST, "/api/v1/caisse/demands", Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["record"]["id"]
        .as_str()
        .expect("demand id")
        .to_string()
}

#[tokio::test]
async fn submit_route_creates_pending_demands() {
    let harness = harness();
    let router = router(&harness);
    let id = submitted_demand_id(&router).await;

    let (status, body) = send(
        &router,
        request(Method::GET, &format!("/api/v1/caisse/demands/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_eq!(body["record"]["status"], "PENDING");
    assert_eq!(body["record"]["createdBy"], "agent-guichet-02");
    assert_eq!(body["record"]["subscriptionTier"]["amountPerMonth"], 10_000);
}

#[tokio::test]
async fn invalid_submission_is_unprocessable() {
    let harness = harness();
    let router = router(&harness);
    let mut submission = serde_json::to_value(submission("C")).expect("serializable");
    submission["paymentFrequency"] = json!("YEARLY");

    let (status, body) = send(
        &router,
        request(Method::POST, "/api/v1/caisse/demands", Some(submission)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn decision_and_conversion_routes_follow_the_state_machine() {
    let harness = harness();
    let router = router(&harness);
    let id = submitted_demand_id(&router).await;

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/caisse/demands/{id}/approve"),
            Some(json!({ "reason": "ok" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/caisse/demands/{id}/approve"),
            Some(json!({ "reason": REASON })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["status"], "APPROVED");
    assert_eq!(body["record"]["decisionMadeBy"], "agent-guichet-02");

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/caisse/demands/{id}/reject"),
            Some(json!({ "reason": REASON })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");

    let convert = format!("/api/v1/caisse/demands/{id}/convert");
    let (status, contract) = send(&router, request(Method::POST, &convert, None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(contract["status"], "ACTIVE");
    assert_eq!(contract["firstPaymentDate"], Value::Null);

    let (status, body) = send(&router, request(Method::POST, &convert, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_converted");
}

#[tokio::test]
async fn delete_route_checks_the_confirmation() {
    let harness = harness();
    let router = router(&harness);
    let id = submitted_demand_id(&router).await;
    let uri = format!("/api/v1/caisse/demands/{id}");

    let (status, _) = send(
        &router,
        request(
            Method::DELETE,
            &uri,
            Some(json!({ "demandId": id, "matricule": "WRONG" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &router,
        request(
            Method::DELETE,
            &uri,
            Some(json!({ "demandId": id, "matricule": member().matricule })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn contract_routes_cover_activation_payments_and_support() {
    let harness = harness();
    let router = router(&harness);
    let contract = harness.converted_contract("C");
    let base = format!("/api/v1/caisse/contracts/{}", contract.id);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("{base}/activate"),
            Some(json!({ "firstPaymentDate": "2024-01-10" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["firstPaymentDate"], "2024-01-10");

    for period in ["2024-01-10", "2024-02-10", "2024-03-10", "2024-04-10"] {
        let (status, body) = send(
            &router,
            request(
                Method::POST,
                &format!("{base}/payments"),
                Some(json!({ "periodDate": period, "paidAt": period })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["payment"]["classification"], "ON_TIME");
    }

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("{base}/support-eligibility?asOf=2024-04-09"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "not_yet_eligible");

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("{base}/supports"),
            Some(json!({ "amount": 60_000, "asOf": "2024-04-10" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["repayBy"], "2024-05-10");
    let support_id = body["id"].as_str().expect("support id").to_string();

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("{base}/support-overdue?asOf=2024-05-11"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overdue"], true);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("{base}/supports/{support_id}/repay"),
            Some(json!({ "settledAt": "2024-05-02" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["late"], false);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("{base}/cancel"),
            Some(json!({ "reason": "Déménagement à l'étranger" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 40_000);

    let (status, body) = send(&router, request(Method::DELETE, &base, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn overdue_routes_report_late_contracts() {
    let harness = harness();
    let router = router(&harness);
    let contract = harness.converted_contract("G");
    harness
        .contracts
        .activate(&contract.id, date(2024, 1, 10), None)
        .expect("activated");

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!(
                "/api/v1/caisse/contracts/{}/overdue?asOf=2024-01-20",
                contract.id
            ),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overdue"], true);
    assert_eq!(body["status"]["classification"], "FORFEITED");

    let (status, body) = send(
        &router,
        request(Method::GET, "/api/v1/caisse/overdue?asOf=2024-01-12", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn due_route_answers_per_calendar_month() {
    let harness = harness();
    let router = router(&harness);
    let contract = harness.converted_contract("C");
    harness
        .contracts
        .activate(&contract.id, date(2024, 1, 10), None)
        .expect("activated");
    let due = |query: &str| {
        request(
            Method::GET,
            &format!("/api/v1/caisse/contracts/{}/due?{query}", contract.id),
            None,
        )
    };

    let (status, body) = send(&router, due("year=2024&month=12")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "year": 2024, "month": 12, "due": true }));

    let (_, body) = send(&router, due("year=2025&month=1")).await;
    assert_eq!(body["due"], false);
    let (_, body) = send(&router, due("year=2024&month=13")).await;
    assert_eq!(body["due"], false);

    let response = router
        .clone()
        .oneshot(due("year=2024"))
        .await
        .expect("router is infallible");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_handler_reports_unavailable_store() {
    let service = Arc::new(DemandService::new(
        catalog(),
        Arc::new(UnavailableRepository),
        Arc::new(MemoryEvents::default()),
        CaissePolicy::default(),
    ));

    let response = crate::workflows::caisse::demands::router::get_handler::<
        UnavailableRepository,
        MemoryEvents,
    >(State(service), Path("DEM-000001".to_string()))
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "repository_error");
}
