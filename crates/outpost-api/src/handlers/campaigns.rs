//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use outpost_core::{DispatchError, StartCampaign};
use outpost_storage::models::{Campaign, CampaignItem};
use outpost_storage::repository::{CampaignItemRepository, CampaignRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AppState;
use crate::handlers::{internal_error, not_found, validation_error, ApiError};

/// Cap on the recent-items page returned with a campaign detail
const RECENT_ITEMS_LIMIT: i64 = 80;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign summary response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub body: String,
    pub block_id: Option<Uuid>,
    pub tag_filter: Option<String>,
    pub match_all_tags: bool,
    pub delay_ms: i32,
    pub max_retries: i32,
    pub status: String,
    pub total: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub done_count: i32,
    pub replied_count: i32,
    pub auto_replied_count: i32,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        Self {
            id: c.id,
            name: c.name,
            body: c.body,
            block_id: c.block_id,
            tag_filter: c.tag_filter,
            match_all_tags: c.match_all_tags,
            delay_ms: c.delay_ms,
            max_retries: c.max_retries,
            status: c.status,
            total: c.total,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            read_count: c.read_count,
            failed_count: c.failed_count,
            skipped_count: c.skipped_count,
            done_count: c.done_count,
            replied_count: c.replied_count,
            auto_replied_count: c.auto_replied_count,
            progress_percentage: progress,
            created_at: c.created_at,
            started_at: c.started_at,
            finished_at: c.finished_at,
        }
    }
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign detail: summary plus the most recently updated items
#[derive(Debug, Serialize)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: CampaignResponse,
    pub pending_count: i64,
    pub sending_count: i64,
    pub recent_items: Vec<CampaignItem>,
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub body: String,
    pub block_id: Option<Uuid>,
    pub tag_filter: Option<String>,
    #[serde(default)]
    pub match_all_tags: bool,
    pub delay_ms: Option<i32>,
    pub max_retries: Option<i32>,
}

/// Response for campaign creation
#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub ok: bool,
    pub id: Uuid,
}

fn map_dispatch_error(context: &str, e: DispatchError) -> ApiError {
    match e {
        DispatchError::NotFound => not_found("Campaign not found"),
        DispatchError::EmptyTarget => {
            validation_error("No recipients matched the target filter")
        }
        DispatchError::InvalidState(expected) => (
            StatusCode::BAD_REQUEST,
            Json(crate::handlers::ErrorResponse {
                error: "invalid_state".to_string(),
                message: format!("Campaign is not in a {} state", expected),
            }),
        ),
        DispatchError::Database(err) => {
            error!("{}: {}", context, err);
            internal_error(context)
        }
    }
}

/// Create a campaign and start dispatching
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(validation_error("Campaign name is required"));
    }
    if input.body.trim().is_empty() {
        return Err(validation_error("Message body is required"));
    }

    let campaign = state
        .dispatcher
        .create_campaign_and_start(StartCampaign {
            name: input.name,
            body: input.body,
            block_id: input.block_id,
            tag_filter: input.tag_filter,
            match_all_tags: input.match_all_tags,
            delay_ms: input.delay_ms,
            max_retries: input.max_retries,
        })
        .await
        .map_err(|e| map_dispatch_error("Failed to create campaign", e))?;

    info!("Created campaign {}", campaign.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            ok: true,
            id: campaign.id,
        }),
    ))
}

/// List campaigns with counters
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaigns = repo.list(query.limit, query.offset).await.map_err(|e| {
        error!("Failed to list campaigns: {}", e);
        internal_error("Failed to list campaigns")
    })?;

    let total = repo.count().await.unwrap_or(0);

    Ok(Json(CampaignListResponse {
        data: campaigns.into_iter().map(CampaignResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Get a campaign with its most recently updated items
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let items_repo = CampaignItemRepository::new(state.db_pool.pool().clone());

    let campaign = repo
        .get(campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    let counts = repo.item_counts(campaign_id).await.map_err(|e| {
        error!("Failed to count campaign items: {}", e);
        internal_error("Failed to count campaign items")
    })?;

    let recent_items = items_repo
        .recent_by_campaign(campaign_id, RECENT_ITEMS_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to list campaign items: {}", e);
            internal_error("Failed to list campaign items")
        })?;

    Ok(Json(CampaignDetailResponse {
        campaign: CampaignResponse::from(campaign),
        pending_count: counts.pending,
        sending_count: counts.sending,
        recent_items,
    }))
}

/// Resume a paused campaign
///
/// POST /api/v1/campaigns/:campaign_id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .dispatcher
        .resume(campaign_id)
        .await
        .map_err(|e| map_dispatch_error("Failed to resume campaign", e))?;

    info!("Resumed campaign {}", campaign_id);
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Cancel a campaign
///
/// POST /api/v1/campaigns/:campaign_id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .dispatcher
        .cancel(campaign_id)
        .await
        .map_err(|e| map_dispatch_error("Failed to cancel campaign", e))?;

    info!("Cancelled campaign {}", campaign_id);
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Reset failed items and resume
///
/// POST /api/v1/campaigns/:campaign_id/retry-failed
pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reset = state
        .dispatcher
        .retry_failed(campaign_id)
        .await
        .map_err(|e| map_dispatch_error("Failed to retry campaign", e))?;

    info!("Retrying {} failed items of campaign {}", reset, campaign_id);
    Ok(Json(serde_json::json!({"ok": true, "reset": reset})))
}
