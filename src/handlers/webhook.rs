//! Webhook receiver for unsolicited provider status callbacks
//!
//! Applies the same terminal-state semantics as the poll path, whether or
//! not a poll worker is currently running for the operation. Deliveries are
//! authenticated against a shared secret and logged before processing.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};

use crate::models::operation::{ErrorResponse, OperationEvent, OperationStatus};
use crate::models::webhook::{WebhookAck, WebhookPayload};
use crate::services::reconciler::{self, ReconcileMetadata};
use crate::services::{operation_store, webhook_log};
use crate::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// POST /api/webhooks/provider
///
/// Returns 200 on any authenticated receipt, including deliveries for
/// already-terminal or unknown operations; the provider must not be asked
/// to retry those.
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<WebhookAck>), (StatusCode, Json<ErrorResponse>)> {
    // Fails closed: without a configured secret every delivery is refused.
    // This is a deploy-time defect, not a per-request condition.
    let Some(expected) = state.webhook_secret.as_deref() else {
        tracing::error!(
            "WEBHOOK_SHARED_SECRET is not configured, refusing provider webhook delivery"
        );
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Webhook secret not configured".to_string(),
            }),
        ));
    };

    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(expected) {
        tracing::warn!("Provider webhook delivery with missing or invalid secret");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid webhook secret".to_string(),
            }),
        ));
    }

    let payload: WebhookPayload = serde_json::from_value(raw.clone()).unwrap_or(WebhookPayload {
        operation_id: None,
        event: None,
        status: None,
        effective_date: None,
        end_to_end_id: None,
        occurrences: None,
        error_message: None,
    });

    let event_name = payload
        .raw_status()
        .unwrap_or("unknown")
        .to_string();

    // Log-then-process: the raw body is on disk before any state mutation
    let delivery = webhook_log::insert_delivery(
        &state.db,
        payload.operation_id.clone(),
        &event_name,
        raw,
    )
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to log delivery: {}", e),
            }),
        )
    })?;

    let Some(operation_id) = payload.operation_id.as_deref() else {
        tracing::warn!("Provider webhook without operation id, logged as delivery {}", delivery.id);
        let _ = webhook_log::mark_error(&state.db, delivery.id, "missing operation id").await;
        return Ok((StatusCode::OK, Json(WebhookAck { received: true, applied_status: None })));
    };

    let Some(reported) = payload.raw_status().and_then(OperationStatus::normalize) else {
        tracing::warn!(
            "Provider webhook for {} with unmappable event {:?}",
            operation_id,
            event_name
        );
        let _ = webhook_log::mark_error(&state.db, delivery.id, "unmappable event").await;
        return Ok((StatusCode::OK, Json(WebhookAck { received: true, applied_status: None })));
    };

    // An operation from another tenant/environment, or one predating this
    // deployment: keep the log row, mutate nothing
    let known = operation_store::find_by_operation_id(&state.db, operation_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Database error: {}", e),
                }),
            )
        })?;

    if known.is_none() {
        tracing::warn!(
            "Provider webhook for unknown operation {}, recorded as delivery {}",
            operation_id,
            delivery.id
        );
        let _ = webhook_log::mark_error(&state.db, delivery.id, "unknown operation").await;
        return Ok((StatusCode::OK, Json(WebhookAck { received: true, applied_status: None })));
    }

    let metadata = ReconcileMetadata {
        effective_date: payload.effective_date,
        end_to_end_id: payload.end_to_end_id.clone(),
        occurrences: payload.occurrences.clone(),
        error_message: payload.error_message.clone(),
        ..Default::default()
    };

    match reconciler::reconcile(&state.db, operation_id, reported, metadata).await {
        Ok(outcome) => {
            if let Err(e) = webhook_log::mark_processed(&state.db, delivery.id).await {
                tracing::warn!("Failed to mark delivery {} processed: {}", delivery.id, e);
            }

            if outcome.changed {
                state
                    .operation_broadcaster
                    .broadcast(OperationEvent::from_model(&outcome.operation));
            }

            Ok((
                StatusCode::OK,
                Json(WebhookAck {
                    received: true,
                    applied_status: Some(outcome.applied.to_string()),
                }),
            ))
        }
        Err(e) => {
            // Leave the row unprocessed so the sweep picks it up, and ask
            // the provider to redeliver
            tracing::error!("Failed to reconcile webhook delivery {}: {}", delivery.id, e);
            let _ = webhook_log::mark_error(&state.db, delivery.id, &e.to_string()).await;
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Reconciliation failed: {}", e),
                }),
            ))
        }
    }
}
