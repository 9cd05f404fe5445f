//! Inbound message repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::InboundMessage;

/// Inbound message repository
#[derive(Clone)]
pub struct InboundMessageRepository {
    pool: PgPool,
}

impl InboundMessageRepository {
    /// Create a new inbound message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an inbound message keyed by provider message id.
    ///
    /// Returns `None` when the id was already recorded (webhook retry); this
    /// conflict is the bot's sole idempotency guard.
    pub async fn insert_dedupe(
        &self,
        provider_message_id: &str,
        from_phone: &str,
        body: Option<&str>,
        raw: &serde_json::Value,
    ) -> Result<Option<InboundMessage>, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, InboundMessage>(
            r#"
            INSERT INTO inbound_messages (id, provider_message_id, from_phone, body, raw)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider_message_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(from_phone)
        .bind(body)
        .bind(raw)
        .fetch_optional(&self.pool)
        .await
    }

}
