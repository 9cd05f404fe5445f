//! API routes

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{blocks, campaigns, health, send, settings, webhook};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Provider webhook (authenticated by shared secret, not bearer token)
    let webhook_routes = Router::new()
        .route("/whapi", post(webhook::receive_webhook))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/cancel", post(campaigns::cancel_campaign))
        .route("/:campaign_id/retry-failed", post(campaigns::retry_failed));

    // Ad-hoc send routes
    let send_routes = Router::new()
        .route("/", post(send::send_message))
        .route("/:message_id/status", get(send::get_send_status));

    // Block and recipient routes
    let block_routes = Router::new()
        .route("/", get(blocks::list_blocks))
        .route("/", post(blocks::create_block))
        .route("/:block_id", get(blocks::get_block))
        .route("/:block_id", delete(blocks::delete_block))
        .route("/:block_id/recipients", get(blocks::list_recipients))
        .route("/:block_id/recipients", post(blocks::add_recipient))
        .route("/:block_id/recipients/import", post(blocks::import_recipients))
        .route("/:block_id/recipients/:recipient_id", put(blocks::update_recipient))
        .route("/:block_id/recipients/:recipient_id", delete(blocks::delete_recipient));

    // Settings routes
    let settings_routes = Router::new()
        .route("/autoreply", get(settings::get_autoreply))
        .route("/autoreply", put(settings::put_autoreply));

    // API v1 routes with operator authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/send", send_routes)
        .route("/messages", get(send::list_messages))
        .nest("/blocks", block_routes)
        .nest("/settings", settings_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
