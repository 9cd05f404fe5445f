//! Outpost - outreach console entry point

use anyhow::Result;
use outpost_api::AppState;
use outpost_common::config::Config;
use outpost_core::{AutoReplyBot, CampaignDispatcher, GatewayClient, WebhookIngestor};
use outpost_storage::db::DatabasePool;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Outpost...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    // Gateway client
    let gateway = Arc::new(GatewayClient::new(&config.gateway));
    if !gateway.is_configured() {
        warn!("Gateway token not configured; campaign sends will fail fast");
    }
    if config.webhook.secret.is_none() {
        warn!("Webhook secret not configured; provider callbacks will be rejected");
    }

    // Core services
    let dispatcher = Arc::new(CampaignDispatcher::new(
        db_pool.pool().clone(),
        gateway.clone(),
        config.dispatch.clone(),
    ));
    let ingestor = WebhookIngestor::new(db_pool.pool().clone());
    let bot = Arc::new(AutoReplyBot::new(db_pool.pool().clone(), gateway.clone()));

    // Campaigns left running by a previous process resume without operator
    // action
    dispatcher.trigger();

    // API server
    let state = Arc::new(AppState {
        db_pool: db_pool.clone(),
        dispatcher: dispatcher.clone(),
        ingestor,
        bot,
        auth_token_digest: config
            .api
            .auth_token
            .as_deref()
            .map(outpost_api::auth::hash_token),
        webhook_secret: config.webhook.secret.clone(),
    });

    let app = outpost_api::create_router(state);
    let bind = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API server listening on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Outpost started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();

    info!("Outpost shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,outpost=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
