//! HTTP handlers for creating and observing async operations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::models::operation::{
    CreateOperationRequest, ErrorResponse, OperationResponse, OperationStatus,
    PollProgressResponse,
};
use crate::services::operation_store;
use crate::services::provider_api::ProviderError;
use crate::AppState;

/// POST /api/operations - submit an operation to the provider and start
/// tracking it
pub async fn create_operation(
    State(state): State<AppState>,
    Json(payload): Json<CreateOperationRequest>,
) -> Result<(StatusCode, Json<OperationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let created = state
        .provider
        .create_operation(payload.kind, &payload.parameters)
        .await
        .map_err(|e| match e {
            // Stale consent needs a reconnect affordance, not a retry
            ProviderError::NeedsReauthorization => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Provider authorization expired, reconnect the account".to_string(),
                }),
            ),
            other => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Provider error: {}", other),
                }),
            ),
        })?;

    let initial_status = created
        .initial_status
        .as_deref()
        .and_then(OperationStatus::normalize)
        .unwrap_or(OperationStatus::Requesting);

    let record = operation_store::insert_new(
        &state.db,
        &created.operation_id,
        payload.kind,
        initial_status,
        payload.linked_entity_id.clone(),
    )
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
            }),
        )
    })?;

    // Statement requests are polled; payments wait for the provider webhook
    if payload.kind.is_polled() && !initial_status.is_terminal() {
        state.pollers.start(&created.operation_id);
    }

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /api/operations/{operation_id} - the stored record the UI observes
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<OperationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let record = find_or_404(&state, &operation_id).await?;
    Ok(Json(record.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListOperationsQuery {
    pub linked_entity_id: Option<String>,
}

/// GET /api/operations - reverse lookup by linked entity, or all in-flight
/// operations when no filter is given
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<ListOperationsQuery>,
) -> Result<Json<Vec<OperationResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let records = match query.linked_entity_id.as_deref() {
        Some(linked) => operation_store::find_by_linked_entity(&state.db, linked).await,
        None => operation_store::find_in_flight(&state.db, None).await,
    }
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
            }),
        )
    })?;

    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// POST /api/operations/{operation_id}/resume - re-attach a poll worker to
/// an in-flight operation ("check again later" after a timeout or reload)
pub async fn resume_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<(StatusCode, Json<OperationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let record = find_or_404(&state, &operation_id).await?;

    let status = OperationStatus::normalize(&record.status);
    if status.map(|s| s.is_terminal()).unwrap_or(false) {
        // Nothing left to poll; hand back the final record
        return Ok((StatusCode::OK, Json(record.into())));
    }

    state
        .pollers
        .resume(&record.operation_id, record.attempts.max(0) as u32);

    Ok((StatusCode::ACCEPTED, Json(record.into())))
}

/// GET /api/operations/{operation_id}/progress - poll progress for UI
/// binding; purely observational
pub async fn get_progress(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<PollProgressResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state.pollers.snapshot(&operation_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No active poll for operation {}", operation_id),
            }),
        )
    })?;

    Ok(Json(PollProgressResponse {
        operation_id,
        active: snapshot.active,
        attempts: snapshot.attempts,
        max_attempts: snapshot.max_attempts,
        progress: snapshot.progress,
        estimated_remaining_ms: snapshot.estimated_remaining.as_millis() as u64,
    }))
}

async fn find_or_404(
    state: &AppState,
    operation_id: &str,
) -> Result<crate::entities::operations::Model, (StatusCode, Json<ErrorResponse>)> {
    operation_store::find_by_operation_id(&state.db, operation_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Database error: {}", e),
                }),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Operation {} not found", operation_id),
                }),
            )
        })
}
