//! Recipient block repository

use outpost_common::types::BlockId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Block, CreateBlock};

/// Block repository
#[derive(Clone)]
pub struct BlockRepository {
    pool: PgPool,
}

impl BlockRepository {
    /// Create a new block repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a block
    pub async fn create(&self, input: CreateBlock) -> Result<Block, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Block>(
            r#"
            INSERT INTO blocks (id, name, description, capacity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.capacity)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a block by ID
    pub async fn get(&self, id: BlockId) -> Result<Option<Block>, sqlx::Error> {
        sqlx::query_as::<_, Block>("SELECT * FROM blocks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List blocks
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Block>, sqlx::Error> {
        sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete a block; member recipients keep existing with a cleared block
    pub async fn delete(&self, id: BlockId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blocks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
