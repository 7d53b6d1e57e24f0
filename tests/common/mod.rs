#![allow(dead_code)]

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{FixedOffset, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use finops_backend::entities::{operations, webhook_deliveries};
use finops_backend::handlers;
use finops_backend::handlers::operations_ws::OperationBroadcaster;
use finops_backend::services::backoff::BackoffPolicy;
use finops_backend::services::poller::{LogObserver, PollConfig, PollerRegistry};
use finops_backend::services::provider_api::ProviderApiService;
use finops_backend::AppState;

/// Build an AppState over a (mock) database connection.
///
/// The provider client points at a dead endpoint; tests that exercise it
/// script the database instead of the network.
pub fn test_state(db: DatabaseConnection, webhook_secret: Option<&str>) -> AppState {
    let provider = ProviderApiService::new(
        "http://localhost:9".to_string(),
        "test-client".to_string(),
        "test-secret".to_string(),
    );

    let poll_config = PollConfig {
        max_attempts: 40,
        backoff: BackoffPolicy::new(Duration::from_millis(5000)),
    };

    let pollers = PollerRegistry::new(
        db.clone(),
        Arc::new(provider.clone()),
        Arc::new(LogObserver),
        poll_config,
    );

    AppState {
        db,
        provider,
        pollers,
        operation_broadcaster: OperationBroadcaster::new(),
        webhook_secret: webhook_secret.map(str::to_string),
    }
}

/// Router mirroring the production route table
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/operations",
            post(handlers::operation::create_operation).get(handlers::operation::list_operations),
        )
        .route(
            "/api/operations/{operation_id}",
            get(handlers::operation::get_operation),
        )
        .route(
            "/api/operations/{operation_id}/resume",
            post(handlers::operation::resume_operation),
        )
        .route(
            "/api/operations/{operation_id}/progress",
            get(handlers::operation::get_progress),
        )
        .route(
            "/api/webhooks/provider",
            post(handlers::webhook::provider_webhook),
        )
        .with_state(state)
}

fn now() -> chrono::DateTime<FixedOffset> {
    Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
}

/// Stored operation fixture
pub fn stored_operation(
    operation_id: &str,
    kind: &str,
    status: &str,
    linked_entity_id: Option<&str>,
) -> operations::Model {
    operations::Model {
        id: 1,
        operation_id: operation_id.to_string(),
        kind: kind.to_string(),
        status: status.to_string(),
        linked_entity_id: linked_entity_id.map(str::to_string),
        attempts: 0,
        result_payload: None,
        error_message: None,
        created_at: now(),
        updated_at: now(),
        completed_at: None,
    }
}

/// Stored webhook delivery fixture, as returned by the insert
pub fn stored_delivery(id: i32, operation_id: Option<&str>, event: &str) -> webhook_deliveries::Model {
    webhook_deliveries::Model {
        id,
        operation_id: operation_id.map(str::to_string),
        event: event.to_string(),
        payload: serde_json::json!({}),
        processed: false,
        error: None,
        received_at: now(),
        processed_at: None,
    }
}
