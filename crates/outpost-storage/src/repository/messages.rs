//! Delivery ledger repository

use outpost_common::types::MessageId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateOutboundMessage, MessageStatus, OutboundMessage};

/// Delivery ledger repository
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a ledger entry for an idempotency token, or fetch the existing
    /// one on conflict.
    ///
    /// Returns the entry and whether this call created it. The unique index
    /// on `client_ref` makes this the double-send guard: a crash-and-retry of
    /// the same attempt number lands on the previously written row.
    pub async fn create_or_get(
        &self,
        input: CreateOutboundMessage,
    ) -> Result<(OutboundMessage, bool), sqlx::Error> {
        let id = Uuid::new_v4();

        let inserted = sqlx::query_as::<_, OutboundMessage>(
            r#"
            INSERT INTO messages (id, phone, body, client_ref, campaign_item_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (client_ref) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.phone)
        .bind(&input.body)
        .bind(&input.client_ref)
        .bind(input.campaign_item_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(message) = inserted {
            return Ok((message, true));
        }

        let existing = sqlx::query_as::<_, OutboundMessage>(
            "SELECT * FROM messages WHERE client_ref = $1",
        )
        .bind(&input.client_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }

    /// Get a ledger entry by ID
    pub async fn get(&self, id: MessageId) -> Result<Option<OutboundMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboundMessage>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a ledger entry by provider message id
    pub async fn get_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<OutboundMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboundMessage>(
            "SELECT * FROM messages WHERE provider_message_id = $1",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List ledger entries, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<OutboundMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboundMessage>(
            "SELECT * FROM messages ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Mark an entry sent with its provider message id
    pub async fn mark_sent(
        &self,
        id: MessageId,
        provider_message_id: &str,
    ) -> Result<Option<OutboundMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            UPDATE messages SET
                status = 'sent',
                provider_message_id = $2,
                error = NULL,
                sent_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an entry failed with an error text
    pub async fn mark_failed(
        &self,
        id: MessageId,
        error: &str,
    ) -> Result<Option<OutboundMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            UPDATE messages SET
                status = 'failed',
                error = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// Apply a webhook-driven status upgrade by provider message id.
    ///
    /// Only upgrades land (rank: read > delivered > sent > failed > pending);
    /// a late lower-rank callback affects zero rows. Delivery and read
    /// timestamps are stamped on first reach.
    pub async fn apply_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<Option<OutboundMessage>, sqlx::Error> {
        let rank = status.rank() as i32;
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            UPDATE messages SET
                status = $2,
                error = COALESCE($4, error),
                sent_at = CASE WHEN $3 >= 2 THEN COALESCE(sent_at, NOW()) ELSE sent_at END,
                delivered_at = CASE WHEN $3 >= 3 THEN COALESCE(delivered_at, NOW()) ELSE delivered_at END,
                read_at = CASE WHEN $3 >= 4 THEN COALESCE(read_at, NOW()) ELSE read_at END
            WHERE provider_message_id = $1
              AND CASE status
                    WHEN 'pending' THEN 0
                    WHEN 'failed' THEN 1
                    WHEN 'sent' THEN 2
                    WHEN 'delivered' THEN 3
                    WHEN 'read' THEN 4
                    ELSE 100
                  END < $3
            RETURNING *
            "#,
        )
        .bind(provider_message_id)
        .bind(status.to_string())
        .bind(rank)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }
}
