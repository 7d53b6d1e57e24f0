//! Migration to create the append-only webhook delivery log
//!
//! Deliveries are persisted before any processing; `processed` stays false
//! until reconciliation succeeds, which makes stuck deliveries detectable.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookDeliveries::Table)
                    .if_not_exists()
                    .col(pk_auto(WebhookDeliveries::Id))
                    .col(string_null(WebhookDeliveries::OperationId))
                    .col(string(WebhookDeliveries::Event).not_null())
                    .col(json(WebhookDeliveries::Payload).not_null())
                    .col(boolean(WebhookDeliveries::Processed).default(false))
                    .col(string_null(WebhookDeliveries::Error))
                    .col(
                        timestamp_with_time_zone(WebhookDeliveries::ReceivedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(WebhookDeliveries::ProcessedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_deliveries_operation_id")
                    .table(WebhookDeliveries::Table)
                    .col(WebhookDeliveries::OperationId)
                    .to_owned(),
            )
            .await?;

        // Scan target for stuck-delivery detection
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_deliveries_processed")
                    .table(WebhookDeliveries::Table)
                    .col(WebhookDeliveries::Processed)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookDeliveries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookDeliveries {
    Table,
    Id,
    OperationId,
    Event,
    Payload,
    Processed,
    Error,
    ReceivedAt,
    ProcessedAt,
}
