//! Idempotent state-transition function shared by the poll and webhook paths
//!
//! Both delivery paths are at-least-once and unordered, so every reported
//! status funnels through here. The terminal-state guard in the store is
//! what makes duplicate and late deliveries safe; this module decides what
//! to write and propagates the at-most-once side effect on the linked
//! ledger transaction.

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;

use crate::entities::operations;
use crate::models::operation::OperationStatus;
use crate::models::statement::{PaymentResult, StatementResult};
use crate::services::operation_store;

type ReconcileError = Box<dyn std::error::Error + Send + Sync>;

/// Settlement details accompanying a reported status
#[derive(Debug, Clone, Default)]
pub struct ReconcileMetadata {
    pub result_payload: Option<serde_json::Value>,
    pub effective_date: Option<NaiveDate>,
    pub end_to_end_id: Option<String>,
    pub occurrences: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl ReconcileMetadata {
    /// The payload to store on completion: an explicit result wins,
    /// otherwise settlement fields are folded into one
    fn into_payload(self) -> (Option<serde_json::Value>, Option<String>) {
        let error_message = self.error_message;

        if let Some(raw) = self.result_payload {
            return (Some(normalize_result(raw)), error_message);
        }

        if self.effective_date.is_none()
            && self.end_to_end_id.is_none()
            && self.occurrences.is_none()
        {
            return (None, error_message);
        }

        let result = PaymentResult {
            effective_date: self.effective_date,
            end_to_end_id: self.end_to_end_id,
            occurrences: self.occurrences,
        };

        (serde_json::to_value(result).ok(), error_message)
    }
}

/// Re-serialize recognizable provider payloads into the canonical stored
/// shape; anything else is kept verbatim
fn normalize_result(raw: serde_json::Value) -> serde_json::Value {
    if let Ok(statement) = serde_json::from_value::<StatementResult>(raw.clone()) {
        return serde_json::to_value(statement).unwrap_or(raw);
    }
    raw
}

/// What a reported status means for the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Record already terminal; the report is late or duplicated
    Ignore,
    /// Forward movement between non-terminal statuses
    Progress,
    /// The report ends the operation
    Finalize,
}

/// Pure transition decision; the store's conditional update enforces it
pub fn plan(current: OperationStatus, reported: OperationStatus) -> Plan {
    if current.is_terminal() {
        Plan::Ignore
    } else if reported.is_terminal() {
        Plan::Finalize
    } else {
        Plan::Progress
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Status actually in effect after the call
    pub applied: OperationStatus,
    /// Whether this call changed the stored record
    pub changed: bool,
    pub operation: operations::Model,
}

/// Apply a provider-reported status to the stored operation.
///
/// Calling this twice with the same terminal status yields the same stored
/// state and fires the linked-entity side effect at most once.
pub async fn reconcile(
    db: &DatabaseConnection,
    operation_id: &str,
    reported: OperationStatus,
    metadata: ReconcileMetadata,
) -> Result<ReconcileOutcome, ReconcileError> {
    let operation = operation_store::find_by_operation_id(db, operation_id)
        .await?
        .ok_or_else(|| format!("Operation {} not found", operation_id))?;

    let current =
        OperationStatus::normalize(&operation.status).unwrap_or(OperationStatus::Requesting);

    match plan(current, reported) {
        Plan::Ignore => {
            tracing::debug!(
                "Operation {} already terminal ({}), ignoring reported {}",
                operation_id,
                current,
                reported
            );
            Ok(ReconcileOutcome {
                applied: current,
                changed: false,
                operation,
            })
        }
        Plan::Progress => {
            operation_store::mark_status(db, operation_id, reported).await?;

            tracing::info!(
                "Operation {} progressed {} -> {}",
                operation_id,
                current,
                reported
            );

            let mut updated = operation;
            updated.status = reported.to_string();
            Ok(ReconcileOutcome {
                applied: reported,
                changed: current != reported,
                operation: updated,
            })
        }
        Plan::Finalize => {
            let effective_date = metadata.effective_date;
            let (payload, error_message) = metadata.into_payload();

            let won = operation_store::complete_terminal(
                db,
                operation_id,
                reported,
                payload.clone(),
                error_message.clone(),
            )
            .await?;

            if !won {
                // Lost the race against the other delivery path; report
                // whatever the winner stored
                let stored = operation_store::find_by_operation_id(db, operation_id)
                    .await?
                    .ok_or_else(|| format!("Operation {} disappeared", operation_id))?;
                let applied = OperationStatus::normalize(&stored.status)
                    .unwrap_or(OperationStatus::Requesting);

                tracing::debug!(
                    "Operation {} was finalized concurrently as {}, reported {} absorbed",
                    operation_id,
                    applied,
                    reported
                );

                return Ok(ReconcileOutcome {
                    applied,
                    changed: false,
                    operation: stored,
                });
            }

            tracing::info!(
                "Operation {} finalized as {} (was {})",
                operation_id,
                reported,
                current
            );

            if reported.is_success() {
                if let Some(linked) = operation.linked_entity_id.as_deref() {
                    let stamped =
                        operation_store::stamp_transaction_paid(db, linked, effective_date)
                            .await?;
                    if stamped {
                        tracing::info!(
                            "Transaction {} marked paid by operation {}",
                            linked,
                            operation_id
                        );
                    } else {
                        tracing::debug!(
                            "Transaction {} already stamped, skipping",
                            linked
                        );
                    }
                }
            }

            let mut updated = operation;
            updated.status = reported.to_string();
            updated.result_payload = payload;
            updated.error_message = error_message;
            Ok(ReconcileOutcome {
                applied: reported,
                changed: true,
                operation: updated,
            })
        }
    }
}
