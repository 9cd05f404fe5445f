//! Block and recipient handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use outpost_storage::models::{Block, CreateBlock, CreateRecipient, Recipient, UpdateRecipient};
use outpost_storage::repository::{BlockRepository, RecipientRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AppState;
use crate::handlers::{internal_error, not_found, validation_error, ApiError};

/// Query parameters for listing
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for creating a block
#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub name: String,
    pub description: Option<String>,
    pub capacity: Option<i32>,
}

/// Request body for creating a recipient
#[derive(Debug, Deserialize)]
pub struct CreateRecipientRequest {
    pub phone: String,
    pub name: Option<String>,
    pub tags: Option<String>,
}

/// Request body for updating a recipient
#[derive(Debug, Deserialize)]
pub struct UpdateRecipientRequest {
    pub block_id: Option<Uuid>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub tags: Option<String>,
}

/// Result of a bulk import
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub ok: bool,
    pub imported: usize,
    pub rejected: usize,
}

/// Create a block
///
/// POST /api/v1/blocks
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateBlockRequest>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(validation_error("Block name is required"));
    }

    let repo = BlockRepository::new(state.db_pool.pool().clone());
    let block = repo
        .create(CreateBlock {
            name: input.name,
            description: input.description,
            capacity: input.capacity,
        })
        .await
        .map_err(|e| {
            error!("Failed to create block: {}", e);
            internal_error("Failed to create block")
        })?;

    info!("Created block {}", block.id);
    Ok((StatusCode::CREATED, Json(block)))
}

/// List blocks
///
/// GET /api/v1/blocks
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Block>>, ApiError> {
    let repo = BlockRepository::new(state.db_pool.pool().clone());
    let blocks = repo.list(query.limit, query.offset).await.map_err(|e| {
        error!("Failed to list blocks: {}", e);
        internal_error("Failed to list blocks")
    })?;

    Ok(Json(blocks))
}

/// Get a block
///
/// GET /api/v1/blocks/:block_id
pub async fn get_block(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
) -> Result<Json<Block>, ApiError> {
    let repo = BlockRepository::new(state.db_pool.pool().clone());
    let block = repo
        .get(block_id)
        .await
        .map_err(|e| {
            error!("Failed to get block: {}", e);
            internal_error("Failed to get block")
        })?
        .ok_or_else(|| not_found("Block not found"))?;

    Ok(Json(block))
}

/// Delete a block
///
/// DELETE /api/v1/blocks/:block_id
pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = BlockRepository::new(state.db_pool.pool().clone());
    let deleted = repo.delete(block_id).await.map_err(|e| {
        error!("Failed to delete block: {}", e);
        internal_error("Failed to delete block")
    })?;

    if deleted {
        info!("Deleted block {}", block_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Block not found"))
    }
}

/// List recipients of a block
///
/// GET /api/v1/blocks/:block_id/recipients
pub async fn list_recipients(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Recipient>>, ApiError> {
    let repo = RecipientRepository::new(state.db_pool.pool().clone());
    let recipients = repo
        .list(Some(block_id), query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list recipients: {}", e);
            internal_error("Failed to list recipients")
        })?;

    Ok(Json(recipients))
}

/// Add a recipient to a block
///
/// POST /api/v1/blocks/:block_id/recipients
pub async fn add_recipient(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
    Json(input): Json<CreateRecipientRequest>,
) -> Result<(StatusCode, Json<Recipient>), ApiError> {
    if input.phone.trim().is_empty() {
        return Err(validation_error("Recipient phone is required"));
    }

    let repo = RecipientRepository::new(state.db_pool.pool().clone());
    let recipient = repo
        .create(CreateRecipient {
            block_id: Some(block_id),
            phone: input.phone,
            name: input.name,
            tags: input.tags,
        })
        .await
        .map_err(|e| {
            error!("Failed to create recipient: {}", e);
            internal_error("Failed to create recipient")
        })?;

    Ok((StatusCode::CREATED, Json(recipient)))
}

/// Bulk-import recipients into a block.
///
/// Rows without a phone are rejected; block capacity is a soft hint and is
/// not enforced here.
///
/// POST /api/v1/blocks/:block_id/recipients/import
pub async fn import_recipients(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
    Json(rows): Json<Vec<CreateRecipientRequest>>,
) -> Result<Json<ImportResponse>, ApiError> {
    let repo = RecipientRepository::new(state.db_pool.pool().clone());

    let mut imported = 0usize;
    let mut rejected = 0usize;

    for row in rows {
        if row.phone.trim().is_empty() {
            rejected += 1;
            continue;
        }

        match repo
            .create(CreateRecipient {
                block_id: Some(block_id),
                phone: row.phone,
                name: row.name,
                tags: row.tags,
            })
            .await
        {
            Ok(_) => imported += 1,
            Err(e) => {
                error!("Failed to import recipient: {}", e);
                rejected += 1;
            }
        }
    }

    info!(
        "Imported {} recipients into block {} ({} rejected)",
        imported, block_id, rejected
    );

    Ok(Json(ImportResponse {
        ok: true,
        imported,
        rejected,
    }))
}

/// Update a recipient
///
/// PUT /api/v1/blocks/:block_id/recipients/:recipient_id
pub async fn update_recipient(
    State(state): State<Arc<AppState>>,
    Path((_block_id, recipient_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateRecipientRequest>,
) -> Result<Json<Recipient>, ApiError> {
    let repo = RecipientRepository::new(state.db_pool.pool().clone());
    let recipient = repo
        .update(
            recipient_id,
            UpdateRecipient {
                block_id: input.block_id,
                phone: input.phone,
                name: input.name,
                tags: input.tags,
            },
        )
        .await
        .map_err(|e| {
            error!("Failed to update recipient: {}", e);
            internal_error("Failed to update recipient")
        })?
        .ok_or_else(|| not_found("Recipient not found"))?;

    Ok(Json(recipient))
}

/// Delete a recipient
///
/// DELETE /api/v1/blocks/:block_id/recipients/:recipient_id
pub async fn delete_recipient(
    State(state): State<Arc<AppState>>,
    Path((_block_id, recipient_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let repo = RecipientRepository::new(state.db_pool.pool().clone());
    let deleted = repo.delete(recipient_id).await.map_err(|e| {
        error!("Failed to delete recipient: {}", e);
        internal_error("Failed to delete recipient")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Recipient not found"))
    }
}
