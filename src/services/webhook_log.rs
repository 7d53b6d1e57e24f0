//! Append-only webhook delivery log
//!
//! Every authenticated delivery is persisted before processing, so replays
//! stay diagnosable even when reconciliation fails. Rows flip to processed
//! only after a successful reconcile, which is what the stuck-delivery sweep
//! keys on.

use chrono::{Duration, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::entities::{prelude::*, webhook_deliveries};

type StoreError = Box<dyn std::error::Error + Send + Sync>;

fn now() -> chrono::DateTime<FixedOffset> {
    Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
}

/// Persist a delivery before any mutation (log-then-process)
pub async fn insert_delivery(
    db: &DatabaseConnection,
    operation_id: Option<String>,
    event: &str,
    payload: serde_json::Value,
) -> Result<webhook_deliveries::Model, StoreError> {
    let record = webhook_deliveries::ActiveModel {
        operation_id: Set(operation_id),
        event: Set(event.to_string()),
        payload: Set(payload),
        processed: Set(false),
        error: Set(None),
        received_at: Set(now()),
        processed_at: Set(None),
        ..Default::default()
    };

    Ok(record.insert(db).await?)
}

/// Mark a delivery processed after reconciliation succeeded
pub async fn mark_processed(db: &DatabaseConnection, delivery_id: i32) -> Result<(), StoreError> {
    WebhookDeliveries::update_many()
        .col_expr(webhook_deliveries::Column::Processed, Expr::value(true))
        .col_expr(webhook_deliveries::Column::Error, Expr::value(Option::<String>::None))
        .col_expr(webhook_deliveries::Column::ProcessedAt, Expr::value(Some(now())))
        .filter(webhook_deliveries::Column::Id.eq(delivery_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Record why a delivery could not be processed; the row stays unprocessed
pub async fn mark_error(
    db: &DatabaseConnection,
    delivery_id: i32,
    error: &str,
) -> Result<(), StoreError> {
    WebhookDeliveries::update_many()
        .col_expr(webhook_deliveries::Column::Error, Expr::value(Some(error.to_string())))
        .filter(webhook_deliveries::Column::Id.eq(delivery_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Unprocessed deliveries older than the threshold, oldest first
pub async fn find_stuck(
    db: &DatabaseConnection,
    older_than_secs: i64,
) -> Result<Vec<webhook_deliveries::Model>, StoreError> {
    let cutoff = now() - Duration::seconds(older_than_secs);

    Ok(WebhookDeliveries::find()
        .filter(webhook_deliveries::Column::Processed.eq(false))
        .filter(webhook_deliveries::Column::ReceivedAt.lt(cutoff))
        .all(db)
        .await?)
}
