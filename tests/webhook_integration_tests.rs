mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::{build_router, stored_delivery, stored_operation, test_state};

fn webhook_request(secret: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/provider")
        .header("content-type", "application/json");

    if let Some(secret) = secret {
        builder = builder.header("x-webhook-secret", secret);
    }

    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn exec_ok() -> MockExecResult {
    MockExecResult {
        last_insert_id: 7,
        rows_affected: 1,
    }
}

/// A delivery without a configured server-side secret is refused outright;
/// deploy-time defect, nothing persisted
#[tokio::test]
async fn test_webhook_rejected_when_secret_unconfigured() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = build_router(test_state(db, None));

    let response = app
        .oneshot(webhook_request(
            Some("irrelevant"),
            json!({"operation_id": "op-1", "event": "PAID"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Wrong secret is rejected with no state mutation
#[tokio::test]
async fn test_webhook_rejected_on_bad_secret() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            Some("wrong"),
            json!({"operation_id": "op-1", "event": "PAID"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Missing secret header behaves like a wrong one
#[tokio::test]
async fn test_webhook_rejected_on_missing_secret_header() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            None,
            json!({"operation_id": "op-1", "event": "PAID"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// PAID delivery for a pending payment: status stored, linked transaction
/// stamped
#[tokio::test]
async fn test_webhook_paid_reconciles_pending_operation() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_delivery(7, Some("op-123"), "PAYMENT_PAID")]])
        .append_query_results([vec![stored_operation(
            "op-123",
            "payment",
            "pending",
            Some("tx-9"),
        )]])
        // terminal write, transaction stamp, delivery mark; one spare slot
        // in case the insert consumes an exec on this backend
        .append_exec_results([exec_ok(), exec_ok(), exec_ok(), exec_ok()])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            Some("hook-secret"),
            json!({
                "operation_id": "op-123",
                "event": "PAYMENT_PAID",
                "effectiveDate": "2026-07-20",
                "endToEndId": "E2E-42"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["received"], true);
    assert_eq!(json["applied_status"], "paid");
}

/// Redelivery after the operation is already terminal is absorbed: still
/// 200, the stored terminal status reported back, no retry requested
#[tokio::test]
async fn test_webhook_redelivery_after_terminal_is_noop() {
    let mut paid = stored_operation("op-123", "payment", "paid", Some("tx-9"));
    paid.completed_at = Some(paid.created_at);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_delivery(8, Some("op-123"), "PAYMENT_PAID")]])
        .append_query_results([vec![paid]])
        .append_exec_results([exec_ok(), exec_ok()])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            Some("hook-secret"),
            json!({"operation_id": "op-123", "event": "PAYMENT_PAID"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["received"], true);
    assert_eq!(json["applied_status"], "paid");
}

/// Unknown operation: event recorded, no mutation, 200 so the provider
/// does not retry
#[tokio::test]
async fn test_webhook_unknown_operation_recorded_without_mutation() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_delivery(9, Some("op-elsewhere"), "PAID")]])
        .append_query_results([Vec::<finops_backend::entities::operations::Model>::new()])
        .append_exec_results([exec_ok(), exec_ok()])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            Some("hook-secret"),
            json!({"operation_id": "op-elsewhere", "event": "PAID"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["received"], true);
    assert!(json["applied_status"].is_null());
}

/// Unmappable event names are logged and acknowledged, never retried
#[tokio::test]
async fn test_webhook_unmappable_event_acknowledged() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_delivery(10, Some("op-123"), "SOMETHING_NEW")]])
        .append_exec_results([exec_ok(), exec_ok()])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(webhook_request(
            Some("hook-secret"),
            json!({"operation_id": "op-123", "event": "SOMETHING_NEW"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert!(json["applied_status"].is_null());
}
