pub use super::operations::Entity as Operations;
pub use super::transactions::Entity as Transactions;
pub use super::webhook_deliveries::Entity as WebhookDeliveries;
