use library_circulation::{
    adapters::memory::{MemoryCatalogStore, MemoryMembershipStore, MemoryTransactionStore},
    adapters::postgres::{PostgresCatalogStore, PostgresMembershipStore, PostgresTransactionStore},
    api::{handlers::AppState, router::create_router},
    application::lending::{LendingWorkflow, ServiceDependencies, spawn_periodic_sweep},
    config::{AppConfig, StorageBackend},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let policy = config
        .lending_policy()
        .expect("Invalid lending configuration");

    // Initialize adapters
    let service_deps = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            ServiceDependencies {
                catalog_store: Arc::new(MemoryCatalogStore::new()),
                membership_store: Arc::new(MemoryMembershipStore::new()),
                transaction_store: Arc::new(MemoryTransactionStore::new()),
            }
        }
        StorageBackend::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.storage.max_connections)
                .connect(&config.storage.database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run database migrations");

            tracing::info!("Connected to database, migrations applied");

            ServiceDependencies {
                catalog_store: Arc::new(PostgresCatalogStore::new(pool.clone())),
                membership_store: Arc::new(PostgresMembershipStore::new(pool.clone())),
                transaction_store: Arc::new(PostgresTransactionStore::new(pool)),
            }
        }
    };

    let workflow = Arc::new(LendingWorkflow::new(service_deps, policy));

    // Optional periodic overdue sweep
    if let Some(secs) = config.sweep.interval_secs.filter(|secs| *secs > 0) {
        tracing::info!(interval_secs = secs, "Starting periodic overdue sweep");
        spawn_periodic_sweep(workflow.clone(), Duration::from_secs(secs));
    }

    // Create router
    let app_state = Arc::new(AppState { workflow });
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
