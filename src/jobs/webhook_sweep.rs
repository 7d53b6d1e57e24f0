//! Periodic sweep for stuck webhook deliveries
//!
//! A delivery that is still unprocessed after the threshold means the
//! original request failed mid-processing or referenced an operation we
//! could not resolve. Reconciliation is idempotent, so replaying is safe.

use sea_orm::DatabaseConnection;
use tokio::time::{interval, Duration};

use crate::handlers::operations_ws::OperationBroadcaster;
use crate::models::operation::{OperationEvent, OperationStatus};
use crate::models::webhook::WebhookPayload;
use crate::services::reconciler::{self, ReconcileMetadata};
use crate::services::{operation_store, webhook_log};

const SWEEP_INTERVAL_SECS: u64 = 300;
const STUCK_THRESHOLD_SECS: i64 = 600;

pub async fn start_webhook_sweep_job(db: DatabaseConnection, broadcaster: OperationBroadcaster) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = sweep_stuck_deliveries(&db, &broadcaster).await {
                tracing::error!("Webhook sweep failed: {}", e);
            }
        }
    });
}

async fn sweep_stuck_deliveries(
    db: &DatabaseConnection,
    broadcaster: &OperationBroadcaster,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let stuck = webhook_log::find_stuck(db, STUCK_THRESHOLD_SECS).await?;

    if stuck.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        "Found {} unprocessed webhook deliveries older than {}s",
        stuck.len(),
        STUCK_THRESHOLD_SECS
    );

    for delivery in stuck {
        let Some(operation_id) = delivery.operation_id.clone() else {
            // Nothing to resolve against; the row stays for audit
            continue;
        };

        let payload: WebhookPayload = match serde_json::from_value(delivery.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Delivery {} has unparseable payload: {}", delivery.id, e);
                continue;
            }
        };

        let Some(reported) = payload.raw_status().and_then(OperationStatus::normalize) else {
            continue;
        };

        match operation_store::find_by_operation_id(db, &operation_id).await? {
            None => {
                tracing::warn!(
                    "Delivery {} still references unknown operation {}",
                    delivery.id,
                    operation_id
                );
            }
            Some(_) => {
                let metadata = ReconcileMetadata {
                    effective_date: payload.effective_date,
                    end_to_end_id: payload.end_to_end_id.clone(),
                    occurrences: payload.occurrences.clone(),
                    error_message: payload.error_message.clone(),
                    ..Default::default()
                };

                match reconciler::reconcile(db, &operation_id, reported, metadata).await {
                    Ok(outcome) => {
                        webhook_log::mark_processed(db, delivery.id).await?;
                        tracing::info!(
                            "Replayed delivery {} for operation {} ({})",
                            delivery.id,
                            operation_id,
                            outcome.applied
                        );

                        if outcome.changed {
                            broadcaster.broadcast(OperationEvent::from_model(&outcome.operation));
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            "Replay of delivery {} failed: {}",
                            delivery.id,
                            e
                        );
                        let _ = webhook_log::mark_error(db, delivery.id, &e.to_string()).await;
                    }
                }
            }
        }
    }

    Ok(())
}
