// src/lib.rs

use sea_orm::DatabaseConnection;

use handlers::operations_ws::OperationBroadcaster;
use services::poller::PollerRegistry;
use services::provider_api::ProviderApiService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub provider: ProviderApiService,
    pub pollers: PollerRegistry,
    pub operation_broadcaster: OperationBroadcaster,
    pub webhook_secret: Option<String>,
}

pub mod entities {
    pub mod prelude;
    pub mod operations;
    pub mod transactions;
    pub mod webhook_deliveries;
}

pub mod services {
    pub mod backoff;
    pub mod operation_store;
    pub mod poller;
    pub mod provider_api;
    pub mod reconciler;
    pub mod webhook_log;
}

pub mod models;
pub mod handlers;
pub mod jobs;
