//! Campaign repository

use chrono::{DateTime, Utc};
use outpost_common::types::CampaignId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Campaign, CampaignItemCounts, CampaignStatus, CreateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a campaign in `running` state with a precomputed total
    pub async fn create(
        &self,
        input: CreateCampaign,
        total: i32,
        started_at: DateTime<Utc>,
    ) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, name, body, block_id, tag_filter, match_all_tags,
                delay_ms, max_retries, status, total, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'running', $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.body)
        .bind(input.block_id)
        .bind(&input.tag_filter)
        .bind(input.match_all_tags)
        .bind(input.delay_ms)
        .bind(input.max_retries)
        .bind(total)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count campaigns
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM campaigns")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Next running campaign to dispatch, oldest start first
    pub async fn next_running(&self) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'running'
            ORDER BY started_at ASC NULLS FIRST
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// Update campaign status
    pub async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a campaign finished (done/cancelled/failed) with a finish time
    pub async fn finish(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Resume a paused or finished campaign: back to `running`, finish time
    /// cleared. Items are re-entered from wherever they were left.
    pub async fn resume(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'running',
                finished_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('paused', 'done', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Per-status item counts for a campaign
    pub async fn item_counts(&self, id: CampaignId) -> Result<CampaignItemCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'sending') as sending,
                COUNT(*) FILTER (WHERE status = 'sent') as sent,
                COUNT(*) FILTER (WHERE status = 'delivered') as delivered,
                COUNT(*) FILTER (WHERE status = 'read') as read,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) FILTER (WHERE status = 'skipped') as skipped
            FROM campaign_items
            WHERE campaign_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CampaignItemCounts {
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            sending: row.get::<Option<i64>, _>("sending").unwrap_or(0),
            sent: row.get::<Option<i64>, _>("sent").unwrap_or(0),
            delivered: row.get::<Option<i64>, _>("delivered").unwrap_or(0),
            read: row.get::<Option<i64>, _>("read").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
            skipped: row.get::<Option<i64>, _>("skipped").unwrap_or(0),
        })
    }

    /// Recompute all aggregate counters from item rows in one statement.
    ///
    /// This is the single counter-update path for the dispatch loop, the
    /// webhook ingestor, and the bot, so incremental and recomputed values
    /// cannot drift.
    pub async fn refresh_counters(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE campaigns SET
                sent_count = agg.sent,
                delivered_count = agg.delivered,
                read_count = agg.read,
                failed_count = agg.failed,
                skipped_count = agg.skipped,
                done_count = agg.done,
                replied_count = agg.replied,
                auto_replied_count = agg.auto_replied,
                updated_at = NOW()
            FROM (
                SELECT
                    COUNT(*) FILTER (WHERE status IN ('sent', 'delivered', 'read')) as sent,
                    COUNT(*) FILTER (WHERE status IN ('delivered', 'read')) as delivered,
                    COUNT(*) FILTER (WHERE status = 'read') as read,
                    COUNT(*) FILTER (WHERE status = 'failed') as failed,
                    COUNT(*) FILTER (WHERE status = 'skipped') as skipped,
                    COUNT(*) FILTER (WHERE status NOT IN ('pending', 'sending')) as done,
                    COUNT(*) FILTER (WHERE first_reply_at IS NOT NULL) as replied,
                    COALESCE(SUM(auto_reply_count), 0) as auto_replied
                FROM campaign_items
                WHERE campaign_id = $1
            ) agg
            WHERE campaigns.id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
