//! Migration to create the operations table for tracking asynchronous
//! provider-fulfilled operations (statement requests, payments)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Operations::Table)
                    .if_not_exists()
                    .col(pk_auto(Operations::Id))
                    .col(string(Operations::OperationId).not_null())
                    .col(string(Operations::Kind).not_null())
                    .col(string(Operations::Status).not_null())
                    .col(string_null(Operations::LinkedEntityId))
                    .col(integer(Operations::Attempts).default(0))
                    .col(json_null(Operations::ResultPayload))
                    .col(string_null(Operations::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Operations::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Operations::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Operations::CompletedAt))
                    .to_owned(),
            )
            .await?;

        // operation_id is the provider-issued idempotency key
        manager
            .create_index(
                Index::create()
                    .name("idx_operations_operation_id")
                    .table(Operations::Table)
                    .col(Operations::OperationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Reverse lookup from the linked business entity
        manager
            .create_index(
                Index::create()
                    .name("idx_operations_linked_entity_id")
                    .table(Operations::Table)
                    .col(Operations::LinkedEntityId)
                    .to_owned(),
            )
            .await?;

        // Index for querying in-flight operations
        manager
            .create_index(
                Index::create()
                    .name("idx_operations_status")
                    .table(Operations::Table)
                    .col(Operations::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Operations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Operations {
    Table,
    Id,
    OperationId,
    Kind,
    Status,
    LinkedEntityId,
    Attempts,
    ResultPayload,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}
