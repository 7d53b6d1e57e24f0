mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::Value;
use tower::ServiceExt;

use crate::common::{build_router, stored_operation, test_state};

/// The UI observes the stored record by provider operation id
#[tokio::test]
async fn test_get_operation_returns_stored_record() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_operation(
            "op-123",
            "statement_request",
            "processing",
            None,
        )]])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/operations/op-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["operation_id"], "op-123");
    assert_eq!(json["status"], "processing");
    assert_eq!(json["kind"], "statement_request");
}

#[tokio::test]
async fn test_get_operation_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<finops_backend::entities::operations::Model>::new()])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/operations/op-missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Reverse lookup from the linked business entity
#[tokio::test]
async fn test_list_operations_by_linked_entity() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_operation(
            "op-123",
            "payment",
            "pending",
            Some("tx-9"),
        )]])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/operations?linked_entity_id=tx-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["linked_entity_id"], "tx-9");
}

/// Resuming a terminal operation hands back the final record instead of
/// starting a poll loop
#[tokio::test]
async fn test_resume_terminal_operation_is_noop() {
    let mut completed = stored_operation("op-123", "statement_request", "completed", None);
    completed.completed_at = Some(completed.created_at);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![completed]])
        .into_connection();

    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/operations/op-123/resume")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "completed");
}

/// Progress endpoint is observational; nothing polling means 404, not an
/// empty snapshot
#[tokio::test]
async fn test_progress_without_active_poll_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let app = build_router(test_state(db, Some("hook-secret")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/operations/op-123/progress")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
