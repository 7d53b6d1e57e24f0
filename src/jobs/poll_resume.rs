//! Startup pass re-attaching poll workers to in-flight operations
//!
//! Poll loops die with the process; the operation records do not. On boot,
//! every statement request still waiting on the provider gets its worker
//! back, continuing from the persisted attempt counter.

use sea_orm::DatabaseConnection;

use crate::models::operation::OperationKind;
use crate::services::operation_store;
use crate::services::poller::PollerRegistry;

pub async fn resume_inflight_operations(db: DatabaseConnection, pollers: PollerRegistry) {
    let in_flight =
        match operation_store::find_in_flight(&db, Some(OperationKind::StatementRequest)).await {
            Ok(ops) => ops,
            Err(e) => {
                tracing::error!("Failed to load in-flight operations: {}", e);
                return;
            }
        };

    if in_flight.is_empty() {
        tracing::info!("No in-flight operations to resume");
        return;
    }

    tracing::info!("Resuming polling for {} in-flight operations", in_flight.len());

    for op in in_flight {
        tracing::info!(
            "Resuming operation {} at attempt {}",
            op.operation_id,
            op.attempts
        );
        pollers.resume(&op.operation_id, op.attempts.max(0) as u32);
    }
}
