//! Recipient repository

use outpost_common::types::{BlockId, RecipientId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateRecipient, Recipient, UpdateRecipient};

/// Recipient repository
#[derive(Clone)]
pub struct RecipientRepository {
    pool: PgPool,
}

impl RecipientRepository {
    /// Create a new recipient repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a recipient
    pub async fn create(&self, input: CreateRecipient) -> Result<Recipient, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Recipient>(
            r#"
            INSERT INTO recipients (id, block_id, phone, name, tags)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.block_id)
        .bind(&input.phone)
        .bind(&input.name)
        .bind(input.tags.unwrap_or_default())
        .fetch_one(&self.pool)
        .await
    }

    /// Get a recipient by ID
    pub async fn get(&self, id: RecipientId) -> Result<Option<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>("SELECT * FROM recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update a recipient
    pub async fn update(
        &self,
        id: RecipientId,
        input: UpdateRecipient,
    ) -> Result<Option<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            r#"
            UPDATE recipients SET
                block_id = COALESCE($2, block_id),
                phone = COALESCE($3, phone),
                name = COALESCE($4, name),
                tags = COALESCE($5, tags),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.block_id)
        .bind(&input.phone)
        .bind(&input.name)
        .bind(&input.tags)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a recipient
    pub async fn delete(&self, id: RecipientId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM recipients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List recipients, optionally restricted to a block
    pub async fn list(
        &self,
        block_id: Option<BlockId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        if let Some(block_id) = block_id {
            sqlx::query_as::<_, Recipient>(
                r#"
                SELECT * FROM recipients
                WHERE block_id = $1
                ORDER BY created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(block_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Recipient>(
                "SELECT * FROM recipients ORDER BY created_at ASC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// All recipients of a block (or the whole store) for campaign targeting;
    /// tag filtering happens in the dispatcher against the snapshot
    pub async fn list_for_targeting(
        &self,
        block_id: Option<BlockId>,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        if let Some(block_id) = block_id {
            sqlx::query_as::<_, Recipient>(
                "SELECT * FROM recipients WHERE block_id = $1 ORDER BY created_at ASC",
            )
            .bind(block_id)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Recipient>("SELECT * FROM recipients ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await
        }
    }

    /// Append a tag to a recipient if it is not already present
    /// (case-insensitive). Used for the idempotent opt-out tag.
    pub async fn add_tag(&self, id: RecipientId, tag: &str) -> Result<bool, sqlx::Error> {
        let Some(recipient) = self.get(id).await? else {
            return Ok(false);
        };

        let tag_lower = tag.trim().to_lowercase();
        if recipient.tags_vec().iter().any(|t| *t == tag_lower) {
            return Ok(false);
        }

        let new_tags = if recipient.tags.trim().is_empty() {
            tag.to_string()
        } else {
            format!("{},{}", recipient.tags.trim_end_matches(','), tag)
        };

        sqlx::query("UPDATE recipients SET tags = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(&new_tags)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }
}
