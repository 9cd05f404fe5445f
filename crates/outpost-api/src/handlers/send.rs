//! Ad-hoc send handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use outpost_common::types::is_usable_phone;
use outpost_core::DispatchError;
use outpost_storage::models::OutboundMessage;
use outpost_storage::repository::MessageRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::auth::AppState;
use crate::handlers::{internal_error, not_found, validation_error, ApiError};

/// Request body for an ad-hoc send
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub body: String,
    /// Optional idempotency key; repeats return the first result
    pub client_ref: Option<String>,
}

/// Ledger entry response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub phone: String,
    pub status: String,
    pub client_ref: String,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<OutboundMessage> for MessageResponse {
    fn from(m: OutboundMessage) -> Self {
        Self {
            id: m.id,
            phone: m.phone,
            status: m.status,
            client_ref: m.client_ref,
            provider_message_id: m.provider_message_id,
            error: m.error,
            created_at: m.created_at,
            sent_at: m.sent_at,
            delivered_at: m.delivered_at,
            read_at: m.read_at,
        }
    }
}

/// Query parameters for listing ledger entries
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Send a single message out of band
///
/// POST /api/v1/send
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SendRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    if !is_usable_phone(&input.to) {
        return Err(validation_error("A usable destination phone is required"));
    }
    if input.body.trim().is_empty() {
        return Err(validation_error("Message body is required"));
    }
    if let Some(client_ref) = &input.client_ref {
        if client_ref.trim().is_empty() {
            return Err(validation_error("client_ref must not be empty"));
        }
    }

    let entry = state
        .dispatcher
        .send_adhoc(&input.to, &input.body, input.client_ref)
        .await
        .map_err(|e| match e {
            DispatchError::Database(err) => {
                error!("Failed to record ad-hoc send: {}", err);
                internal_error("Failed to record send")
            }
            other => {
                error!("Ad-hoc send failed: {}", other);
                internal_error("Failed to send")
            }
        })?;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(entry))))
}

/// Get a ledger entry by ID
///
/// GET /api/v1/send/:message_id/status
pub async fn get_send_status(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let repo = MessageRepository::new(state.db_pool.pool().clone());

    let entry = repo
        .get(message_id)
        .await
        .map_err(|e| {
            error!("Failed to get message: {}", e);
            internal_error("Failed to get message")
        })?
        .ok_or_else(|| not_found("Message not found"))?;

    Ok(Json(MessageResponse::from(entry)))
}

/// List recent ledger entries
///
/// GET /api/v1/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let repo = MessageRepository::new(state.db_pool.pool().clone());

    let entries = repo.list(query.limit, query.offset).await.map_err(|e| {
        error!("Failed to list messages: {}", e);
        internal_error("Failed to list messages")
    })?;

    Ok(Json(entries.into_iter().map(MessageResponse::from).collect()))
}
