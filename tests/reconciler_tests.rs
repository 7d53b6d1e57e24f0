mod common;

use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

use crate::common::stored_operation;
use finops_backend::models::operation::OperationStatus;
use finops_backend::services::reconciler::{self, ReconcileMetadata};

fn exec(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

/// Terminal success on a pending operation wins the conditional update and
/// stamps the linked transaction
#[tokio::test]
async fn test_reconcile_finalizes_and_stamps_linked_entity() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_operation(
            "op-123",
            "payment",
            "pending",
            Some("tx-9"),
        )]])
        // terminal write wins, transaction stamp applies
        .append_exec_results([exec(1), exec(1)])
        .into_connection();

    let outcome = reconciler::reconcile(
        &db,
        "op-123",
        OperationStatus::Paid,
        ReconcileMetadata {
            end_to_end_id: Some("E2E-1".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, OperationStatus::Paid);
    assert!(outcome.changed);
    assert_eq!(outcome.operation.status, "paid");
    assert!(outcome.operation.result_payload.is_some());
}

/// Second delivery of the same terminal status is a no-op returning the
/// stored state; the only database access is the initial read
#[tokio::test]
async fn test_reconcile_duplicate_terminal_is_noop() {
    let mut paid = stored_operation("op-123", "payment", "paid", Some("tx-9"));
    paid.completed_at = Some(paid.created_at);

    // No exec slots at all: a second stamp attempt would error the test
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![paid]])
        .into_connection();

    let outcome = reconciler::reconcile(
        &db,
        "op-123",
        OperationStatus::Paid,
        ReconcileMetadata::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, OperationStatus::Paid);
    assert!(!outcome.changed);
}

/// A late "still processing" report after completion must not regress the
/// stored status
#[tokio::test]
async fn test_reconcile_late_nonterminal_does_not_regress() {
    let mut completed = stored_operation("op-123", "statement_request", "completed", None);
    completed.completed_at = Some(completed.created_at);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![completed]])
        .into_connection();

    let outcome = reconciler::reconcile(
        &db,
        "op-123",
        OperationStatus::Processing,
        ReconcileMetadata::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, OperationStatus::Completed);
    assert!(!outcome.changed);
}

/// Losing the conditional update to the other delivery path absorbs the
/// report and skips the side effect
#[tokio::test]
async fn test_reconcile_lost_race_returns_winner_status() {
    let mut winner = stored_operation("op-123", "payment", "rejected", Some("tx-9"));
    winner.completed_at = Some(winner.created_at);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_operation(
            "op-123",
            "payment",
            "processing",
            Some("tx-9"),
        )]])
        .append_query_results([vec![winner]])
        // Only the losing terminal write; a stamp attempt would exhaust
        // the exec queue and fail the test
        .append_exec_results([exec(0)])
        .into_connection();

    let outcome = reconciler::reconcile(
        &db,
        "op-123",
        OperationStatus::Paid,
        ReconcileMetadata::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, OperationStatus::Rejected);
    assert!(!outcome.changed);
}

/// Non-terminal progress updates move the status forward without touching
/// completion fields
#[tokio::test]
async fn test_reconcile_progress_update() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![stored_operation(
            "op-123",
            "payment",
            "pending",
            None,
        )]])
        .append_exec_results([exec(1)])
        .into_connection();

    let outcome = reconciler::reconcile(
        &db,
        "op-123",
        OperationStatus::Processing,
        ReconcileMetadata::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, OperationStatus::Processing);
    assert!(outcome.changed);
    assert!(outcome.operation.completed_at.is_none());
}

/// Reconciling an id that was never stored is an error, not a silent insert
#[tokio::test]
async fn test_reconcile_unknown_operation_errors() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<finops_backend::entities::operations::Model>::new()])
        .into_connection();

    let result = reconciler::reconcile(
        &db,
        "op-missing",
        OperationStatus::Paid,
        ReconcileMetadata::default(),
    )
    .await;

    assert!(result.is_err());
}
