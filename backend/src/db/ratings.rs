//! User ratings (1-10) for movies and shows

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, uuid_to_str};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub id: i64,
    pub user_id: String,
    pub media_item_id: i64,
    pub rating: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct RatingRepository {
    pool: SqlitePool,
}

impl RatingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, media_item_id: i64) -> Result<Option<RatingRecord>> {
        let record = sqlx::query_as::<_, RatingRecord>(
            r#"
            SELECT id, user_id, media_item_id, rating, created_at, updated_at
            FROM ratings
            WHERE user_id = ? AND media_item_id = ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or replace the user's rating for a media item
    pub async fn upsert(
        &self,
        user_id: Uuid,
        media_item_id: i64,
        rating: i64,
        rated_at: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ratings (user_id, media_item_id, rating, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, media_item_id) DO UPDATE SET
                rating = excluded.rating,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .bind(rating)
        .bind(now_iso8601())
        .bind(rated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
