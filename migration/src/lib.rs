pub use sea_orm_migration::prelude::*;

mod m20260720_000001_create_transactions;
mod m20260720_000002_create_operations;
mod m20260720_000003_create_webhook_deliveries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260720_000001_create_transactions::Migration),
            Box::new(m20260720_000002_create_operations::Migration),
            Box::new(m20260720_000003_create_webhook_deliveries::Migration),
        ]
    }
}
