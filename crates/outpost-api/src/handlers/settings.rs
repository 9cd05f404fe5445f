//! Bot settings handlers

use axum::{extract::State, Json};
use outpost_core::BotConfig;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::AppState;
use crate::handlers::{internal_error, ApiError};

/// Get the sanitized auto-reply configuration
///
/// GET /api/v1/settings/autoreply
pub async fn get_autoreply(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BotConfig>, ApiError> {
    let config = state.bot.load_config().await.map_err(|e| {
        error!("Failed to load bot config: {}", e);
        internal_error("Failed to load bot config")
    })?;

    Ok(Json(config))
}

/// Replace the auto-reply configuration.
///
/// The body is coerced field-by-field; anything missing or out of range is
/// sanitized to defaults before persisting, and the sanitized result is
/// returned.
///
/// PUT /api/v1/settings/autoreply
pub async fn put_autoreply(
    State(state): State<Arc<AppState>>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<BotConfig>, ApiError> {
    let config = BotConfig::from_value(Some(&value));

    let saved = state.bot.save_config(config).await.map_err(|e| {
        error!("Failed to save bot config: {}", e);
        internal_error("Failed to save bot config")
    })?;

    info!("Auto-reply configuration updated");
    Ok(Json(saved))
}
