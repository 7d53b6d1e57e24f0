//! Persistence operations for async operation records
//!
//! All status writes are conditional on the row not already being terminal,
//! which is what lets the poll and webhook paths race safely without an
//! in-process lock.

use chrono::{FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::entities::{operations, prelude::*, transactions};
use crate::models::operation::{OperationKind, OperationStatus};

type StoreError = Box<dyn std::error::Error + Send + Sync>;

fn now() -> chrono::DateTime<FixedOffset> {
    Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
}

/// Insert a freshly created operation record
pub async fn insert_new(
    db: &DatabaseConnection,
    operation_id: &str,
    kind: OperationKind,
    initial_status: OperationStatus,
    linked_entity_id: Option<String>,
) -> Result<operations::Model, StoreError> {
    let ts = now();
    let record = operations::ActiveModel {
        operation_id: Set(operation_id.to_string()),
        kind: Set(kind.to_string()),
        status: Set(initial_status.to_string()),
        linked_entity_id: Set(linked_entity_id),
        attempts: Set(0),
        result_payload: Set(None),
        error_message: Set(None),
        created_at: Set(ts),
        updated_at: Set(ts),
        completed_at: Set(None),
        ..Default::default()
    };

    Ok(record.insert(db).await?)
}

pub async fn find_by_operation_id(
    db: &DatabaseConnection,
    operation_id: &str,
) -> Result<Option<operations::Model>, StoreError> {
    Ok(Operations::find()
        .filter(operations::Column::OperationId.eq(operation_id))
        .one(db)
        .await?)
}

/// Reverse lookup from the linked business entity
pub async fn find_by_linked_entity(
    db: &DatabaseConnection,
    linked_entity_id: &str,
) -> Result<Vec<operations::Model>, StoreError> {
    Ok(Operations::find()
        .filter(operations::Column::LinkedEntityId.eq(linked_entity_id))
        .all(db)
        .await?)
}

/// Operations still waiting on the provider, optionally narrowed by kind
pub async fn find_in_flight(
    db: &DatabaseConnection,
    kind: Option<OperationKind>,
) -> Result<Vec<operations::Model>, StoreError> {
    let mut query = Operations::find()
        .filter(operations::Column::Status.is_not_in(OperationStatus::terminal_strings()));

    if let Some(kind) = kind {
        query = query.filter(operations::Column::Kind.eq(kind.to_string()));
    }

    Ok(query.all(db).await?)
}

/// Move a non-terminal operation to another non-terminal status.
///
/// A no-op when the row has already reached a terminal status.
pub async fn mark_status(
    db: &DatabaseConnection,
    operation_id: &str,
    status: OperationStatus,
) -> Result<(), StoreError> {
    Operations::update_many()
        .col_expr(operations::Column::Status, Expr::value(status.to_string()))
        .col_expr(operations::Column::UpdatedAt, Expr::value(now()))
        .filter(operations::Column::OperationId.eq(operation_id))
        .filter(operations::Column::Status.is_not_in(OperationStatus::terminal_strings()))
        .exec(db)
        .await?;

    Ok(())
}

/// Persist the poll attempt counter so a resumed worker continues counting
pub async fn record_attempt(
    db: &DatabaseConnection,
    operation_id: &str,
    attempts: u32,
) -> Result<(), StoreError> {
    Operations::update_many()
        .col_expr(operations::Column::Attempts, Expr::value(attempts as i32))
        .col_expr(operations::Column::UpdatedAt, Expr::value(now()))
        .filter(operations::Column::OperationId.eq(operation_id))
        .filter(operations::Column::Status.is_not_in(OperationStatus::terminal_strings()))
        .exec(db)
        .await?;

    Ok(())
}

/// Conditional terminal write; the single-writer gate between the poll and
/// webhook paths.
///
/// Returns true if this caller won the transition, false if the row was
/// already terminal.
pub async fn complete_terminal(
    db: &DatabaseConnection,
    operation_id: &str,
    status: OperationStatus,
    result_payload: Option<serde_json::Value>,
    error_message: Option<String>,
) -> Result<bool, StoreError> {
    let ts = now();
    let result = Operations::update_many()
        .col_expr(operations::Column::Status, Expr::value(status.to_string()))
        .col_expr(operations::Column::ResultPayload, Expr::value(result_payload))
        .col_expr(operations::Column::ErrorMessage, Expr::value(error_message))
        .col_expr(operations::Column::UpdatedAt, Expr::value(ts))
        .col_expr(operations::Column::CompletedAt, Expr::value(Some(ts)))
        .filter(operations::Column::OperationId.eq(operation_id))
        .filter(operations::Column::Status.is_not_in(OperationStatus::terminal_strings()))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Stamp the linked ledger transaction as paid, at most once.
///
/// The `paid_at IS NULL` guard makes a second reconciliation attempt a safe
/// no-op.
pub async fn stamp_transaction_paid(
    db: &DatabaseConnection,
    transaction_id: &str,
    paid_at: Option<chrono::NaiveDate>,
) -> Result<bool, StoreError> {
    let ts = now();
    let stamped = paid_at
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().with_timezone(&FixedOffset::east_opt(0).unwrap()))
        .unwrap_or(ts);

    let result = Transactions::update_many()
        .col_expr(transactions::Column::Status, Expr::value("paid"))
        .col_expr(transactions::Column::PaidAt, Expr::value(Some(stamped)))
        .col_expr(transactions::Column::UpdatedAt, Expr::value(ts))
        .filter(transactions::Column::Id.eq(transaction_id))
        .filter(transactions::Column::PaidAt.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}
