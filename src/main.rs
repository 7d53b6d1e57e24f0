use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finops_backend::handlers;
use finops_backend::handlers::operations_ws::{BroadcastObserver, OperationBroadcaster};
use finops_backend::jobs;
use finops_backend::services::backoff::BackoffPolicy;
use finops_backend::services::poller::{PollConfig, PollerRegistry};
use finops_backend::services::provider_api::ProviderApiService;
use finops_backend::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,finops_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let provider = ProviderApiService::new(
        env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://api.provider.example".to_string()),
        env::var("PROVIDER_CLIENT_ID").unwrap_or_default(),
        env::var("PROVIDER_CLIENT_SECRET").unwrap_or_default(),
    );

    // Fail-closed configuration: without the secret, webhook deliveries
    // are refused
    let webhook_secret = env::var("WEBHOOK_SHARED_SECRET").ok();
    if webhook_secret.is_none() {
        tracing::error!(
            "WEBHOOK_SHARED_SECRET is not set, provider webhook deliveries will be refused"
        );
    }

    let max_attempts = env::var("POLL_MAX_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(40);
    let base_interval_ms = env::var("POLL_BASE_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);
    let poll_config = PollConfig {
        max_attempts,
        backoff: BackoffPolicy::new(Duration::from_millis(base_interval_ms)),
    };

    let operation_broadcaster = OperationBroadcaster::new();
    let pollers = PollerRegistry::new(
        db.clone(),
        Arc::new(provider.clone()),
        Arc::new(BroadcastObserver::new(operation_broadcaster.clone())),
        poll_config,
    );

    let state = AppState {
        db: db.clone(),
        provider,
        pollers: pollers.clone(),
        operation_broadcaster: operation_broadcaster.clone(),
        webhook_secret,
    };

    // Re-attach pollers to operations that were in flight before restart
    jobs::poll_resume::resume_inflight_operations(db.clone(), pollers).await;

    // Replay stuck webhook deliveries periodically
    jobs::webhook_sweep::start_webhook_sweep_job(db.clone(), operation_broadcaster).await;

    // Build router
    let app = Router::new()
        .route("/", get(health))
        .route(
            "/api/operations",
            post(handlers::operation::create_operation).get(handlers::operation::list_operations),
        )
        .route(
            "/api/operations/ws",
            get(handlers::operations_ws::operations_websocket),
        )
        .route(
            "/api/operations/{operation_id}",
            get(handlers::operation::get_operation),
        )
        .route(
            "/api/operations/{operation_id}/resume",
            post(handlers::operation::resume_operation),
        )
        .route(
            "/api/operations/{operation_id}/progress",
            get(handlers::operation::get_progress),
        )
        .route(
            "/api/webhooks/provider",
            post(handlers::webhook::provider_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "finops-backend up"
}
