//! Webhook audit log repository (append-only)

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::WebhookLog;

/// Webhook log repository
#[derive(Clone)]
pub struct WebhookLogRepository {
    pool: PgPool,
}

impl WebhookLogRepository {
    /// Create a new webhook log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a log entry. Called before any parsing so unrecognized
    /// payloads are still available for forensic replay.
    pub async fn append(
        &self,
        event_type: Option<&str>,
        provider_message_id: Option<&str>,
        status_text: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<WebhookLog, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, WebhookLog>(
            r#"
            INSERT INTO webhook_logs (id, event_type, provider_message_id, status_text, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(event_type)
        .bind(provider_message_id)
        .bind(status_text)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
    }

}
