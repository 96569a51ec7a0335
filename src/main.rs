//! Dropship settlement server
//!
//! Receives payment gateway callbacks, settles orders into supplier
//! balances and serves the supplier and admin financial endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dropship_settlement::jobs::JobScheduler;
use dropship_settlement::outbox::{HttpSink, OutboxDispatcher};
use dropship_settlement::{api, db, Config, PgStore, SettlementEngine};

const DEFAULT_LOG_FILTER: &str = "dropship_settlement=debug,tower_http=debug";

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting settlement server");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let store = Arc::new(PgStore::new(pool.clone()));
    let engine = Arc::new(SettlementEngine::new(store.clone(), config.settlement()));

    if config.forward_urls.is_empty() {
        tracing::warn!("WEBHOOK_FORWARD_URLS is empty, outbound events will be marked delivered without sending");
    }
    let sink = Arc::new(HttpSink::new(
        config.forward_urls.clone(),
        Duration::from_secs(10),
    )?);
    let dispatcher = Arc::new(OutboxDispatcher::new(
        store,
        sink,
        config.retry_policy(),
        config.outbox_batch_size,
    ));

    let scheduler = JobScheduler::with_config(engine.clone(), dispatcher, config.scheduler()).start();

    let app = api::build_app(engine);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    scheduler.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
