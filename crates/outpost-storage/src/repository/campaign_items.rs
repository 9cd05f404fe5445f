//! Campaign item repository

use chrono::{DateTime, Utc};
use outpost_common::types::{CampaignId, CampaignItemId, MessageId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CampaignItem, CreateCampaignItem, ItemStatus};

/// Campaign item repository
#[derive(Clone)]
pub struct CampaignItemRepository {
    pool: PgPool,
}

impl CampaignItemRepository {
    /// Create a new campaign item repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create campaign items in bulk inside one transaction
    pub async fn create_batch(
        &self,
        campaign_id: CampaignId,
        items: Vec<CreateCampaignItem>,
    ) -> Result<u64, sqlx::Error> {
        let mut count = 0u64;
        let mut tx = self.pool.begin().await?;

        for input in items {
            let id = Uuid::new_v4();
            let result = sqlx::query(
                r#"
                INSERT INTO campaign_items (
                    id, campaign_id, recipient_id, phone, name, tags, block_id, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(id)
            .bind(campaign_id)
            .bind(input.recipient_id)
            .bind(&input.phone)
            .bind(&input.name)
            .bind(&input.tags)
            .bind(input.block_id)
            .bind(input.status.to_string())
            .execute(&mut *tx)
            .await?;

            count += result.rows_affected();
        }

        tx.commit().await?;
        Ok(count)
    }

    /// Get an item by ID
    pub async fn get(&self, id: CampaignItemId) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>("SELECT * FROM campaign_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find the next eligible item for a campaign.
    ///
    /// Eligible rows are pending items whose retry gate has passed, ordered
    /// FIFO with the retry delay respected, plus `sending` rows whose claim
    /// went stale (crashed worker) and may be taken over.
    pub async fn next_eligible(
        &self,
        campaign_id: CampaignId,
        inflight_ttl_secs: i64,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            SELECT * FROM campaign_items
            WHERE campaign_id = $1
              AND (
                (status = 'pending' AND (next_attempt_at IS NULL OR next_attempt_at <= NOW()))
                OR (status = 'sending' AND last_attempt_at < NOW() - ($2 * INTERVAL '1 second'))
              )
            ORDER BY next_attempt_at ASC NULLS FIRST, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(campaign_id)
        .bind(inflight_ttl_secs)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically claim an item for sending.
    ///
    /// A fresh claim moves pending -> sending and counts the attempt before
    /// any send happens. A takeover of a stale `sending` row keeps the stored
    /// attempt number so the retried attempt reuses its idempotency token.
    /// Exactly one concurrent claimer sees a row come back; the rest get
    /// `None` and move on.
    pub async fn claim(
        &self,
        id: CampaignItemId,
        inflight_ttl_secs: i64,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                status = 'sending',
                attempts = CASE WHEN status = 'pending' THEN attempts + 1 ELSE attempts END,
                last_attempt_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND (
                status = 'pending'
                OR (status = 'sending' AND last_attempt_at < NOW() - ($2 * INTERVAL '1 second'))
              )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(inflight_ttl_secs)
        .fetch_optional(&self.pool)
        .await
    }

    /// Release a claimed item whose previous attempt may still be in flight.
    ///
    /// The claim's attempt increment is undone (no send happened), so the
    /// next claim recomputes the same idempotency token and re-checks the
    /// outstanding ledger entry.
    pub async fn release_inflight(
        &self,
        id: CampaignItemId,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                status = 'pending',
                attempts = GREATEST(attempts - 1, 0),
                next_attempt_at = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an item sent and link its ledger entry
    pub async fn mark_sent(
        &self,
        id: CampaignItemId,
        message_id: MessageId,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                status = 'sent',
                message_id = $2,
                next_attempt_at = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an item terminally failed
    pub async fn mark_failed(
        &self,
        id: CampaignItemId,
        error: &str,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                status = 'failed',
                next_attempt_at = NULL,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// Put an item back in the retry queue with a future attempt gate
    pub async fn reschedule(
        &self,
        id: CampaignItemId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                status = 'pending',
                next_attempt_at = $2,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// Apply a webhook-driven status upgrade, honoring the progress rank.
    ///
    /// The update only lands when the new status outranks the current one and
    /// the item is not in an absorbing state; a stale lower-rank callback
    /// affects zero rows.
    pub async fn apply_status_upgrade(
        &self,
        id: CampaignItemId,
        status: ItemStatus,
    ) -> Result<bool, sqlx::Error> {
        let rank = status.rank() as i32;
        let result = sqlx::query(
            r#"
            UPDATE campaign_items SET
                status = $2,
                updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('failed', 'skipped')
              AND CASE status
                    WHEN 'pending' THEN 0
                    WHEN 'sending' THEN 1
                    WHEN 'sent' THEN 2
                    WHEN 'delivered' THEN 3
                    WHEN 'read' THEN 4
                    ELSE 100
                  END < $3
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(rank)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count items still open (pending or sending) for a campaign
    pub async fn open_count(&self, campaign_id: CampaignId) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_items WHERE campaign_id = $1 AND status IN ('pending', 'sending')",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Reset all failed items of a campaign back to pending for a fresh run
    pub async fn reset_failed(&self, campaign_id: CampaignId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_items SET
                status = 'pending',
                next_attempt_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE campaign_id = $1 AND status = 'failed'
            "#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Recently updated items for the campaign detail view
    pub async fn recent_by_campaign(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            SELECT * FROM campaign_items
            WHERE campaign_id = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Most recent campaign touch for a sender within the lookback window,
    /// used by the auto-reply bot to associate inbound messages
    pub async fn latest_touch_for_phone(
        &self,
        phone: &str,
        lookback_days: i64,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            SELECT * FROM campaign_items
            WHERE phone = $1
              AND updated_at >= NOW() - ($2 * INTERVAL '1 day')
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .bind(lookback_days)
        .fetch_optional(&self.pool)
        .await
    }

    /// Record an inbound reply on an item and link the inbound message row,
    /// in one transaction. First replies also stamp `first_reply_at`.
    pub async fn record_reply_with_link(
        &self,
        id: CampaignItemId,
        inbound_id: Uuid,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                reply_count = reply_count + 1,
                first_reply_at = COALESCE(first_reply_at, NOW()),
                last_reply_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if item.is_some() {
            sqlx::query("UPDATE inbound_messages SET campaign_item_id = $2 WHERE id = $1")
                .bind(inbound_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(item)
    }

    /// Count a successful auto-reply against the item's cap
    pub async fn record_auto_reply(
        &self,
        id: CampaignItemId,
    ) -> Result<Option<CampaignItem>, sqlx::Error> {
        sqlx::query_as::<_, CampaignItem>(
            r#"
            UPDATE campaign_items SET
                auto_reply_count = auto_reply_count + 1,
                last_auto_reply_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
