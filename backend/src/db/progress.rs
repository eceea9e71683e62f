//! Per-user watch status for movies and shows
//!
//! One row per `(user, media item)`. Status changes are not validated as a
//! state machine; callers decide which transitions to apply. The one rule
//! enforced here is that a watchlist entry never downgrades a title the user
//! has already started or finished.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::media_items::MediaType;
use super::sqlite_helpers::{now_iso8601, uuid_to_str};

/// Watch status for a movie or show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    PlanToWatch,
    Watching,
    Completed,
    Dropped,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::PlanToWatch => "plan_to_watch",
            WatchStatus::Watching => "watching",
            WatchStatus::Completed => "completed",
            WatchStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan_to_watch" => Some(WatchStatus::PlanToWatch),
            "watching" => Some(WatchStatus::Watching),
            "completed" => Some(WatchStatus::Completed),
            "dropped" => Some(WatchStatus::Dropped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressRecord {
    pub id: i64,
    pub user_id: String,
    pub media_item_id: i64,
    pub status: String,
    pub progress: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProgressRecord {
    pub fn watch_status(&self) -> Option<WatchStatus> {
        WatchStatus::parse(&self.status)
    }
}

/// A library entry: the user's progress joined with the media item
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItemRecord {
    pub media_item_id: i64,
    pub tmdb_id: i64,
    #[serde(rename = "type")]
    pub media_type: String,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub last_air_date: Option<String>,
    pub vote_average: Option<i64>,
    pub status: String,
    pub progress: i64,
    pub updated_at: String,
}

const LIBRARY_SELECT: &str = r#"
    SELECT m.id AS media_item_id, m.tmdb_id, m.type AS media_type, m.title, m.overview,
           m.poster_path, m.backdrop_path, m.release_date, m.last_air_date, m.vote_average,
           p.status, p.progress, p.updated_at
    FROM user_progress p
    INNER JOIN media_items m ON m.id = p.media_item_id
"#;

pub struct ProgressRepository {
    pool: SqlitePool,
}

impl ProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, media_item_id: i64) -> Result<Option<UserProgressRecord>> {
        let record = sqlx::query_as::<_, UserProgressRecord>(
            r#"
            SELECT id, user_id, media_item_id, status, progress, created_at, updated_at
            FROM user_progress
            WHERE user_id = ? AND media_item_id = ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Set status and progress unconditionally (user action)
    pub async fn upsert(
        &self,
        user_id: Uuid,
        media_item_id: i64,
        status: WatchStatus,
        progress: i64,
    ) -> Result<UserProgressRecord> {
        let now = now_iso8601();

        let record = sqlx::query_as::<_, UserProgressRecord>(
            r#"
            INSERT INTO user_progress (user_id, media_item_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, media_item_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                updated_at = excluded.updated_at
            RETURNING id, user_id, media_item_id, status, progress, created_at, updated_at
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .bind(status.as_str())
        .bind(progress)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Force `completed` / 100 from a watched-history entry.
    ///
    /// `watched_at` only stamps a newly created row; an existing row keeps
    /// its timestamps.
    pub async fn mark_completed(&self, user_id: Uuid, media_item_id: i64, watched_at: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, media_item_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, 100, ?, ?)
            ON CONFLICT (user_id, media_item_id) DO UPDATE SET
                status = excluded.status,
                progress = 100
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .bind(WatchStatus::Completed.as_str())
        .bind(now_iso8601())
        .bind(watched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a row only when none exists; returns whether a row was created
    pub async fn insert_if_absent(
        &self,
        user_id: Uuid,
        media_item_id: i64,
        status: WatchStatus,
    ) -> Result<bool> {
        let now = now_iso8601();

        let result = sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, media_item_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT (user_id, media_item_id) DO NOTHING
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a watchlist entry: `plan_to_watch` unless already `watching` or
    /// `completed`. Returns whether the row was created or changed.
    pub async fn apply_watchlist_entry(
        &self,
        user_id: Uuid,
        media_item_id: i64,
        listed_at: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, media_item_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT (user_id, media_item_id) DO UPDATE SET
                status = excluded.status
            WHERE user_progress.status NOT IN (?, ?)
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .bind(WatchStatus::PlanToWatch.as_str())
        .bind(now_iso8601())
        .bind(listed_at)
        .bind(WatchStatus::Watching.as_str())
        .bind(WatchStatus::Completed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Library listing for one media type and status, most recently updated first
    pub async fn list_library(
        &self,
        user_id: Uuid,
        media_type: MediaType,
        status: &str,
    ) -> Result<Vec<LibraryItemRecord>> {
        let records = sqlx::query_as::<_, LibraryItemRecord>(&format!(
            "{} WHERE p.user_id = ? AND m.type = ? AND p.status = ? ORDER BY p.updated_at DESC",
            LIBRARY_SELECT
        ))
        .bind(uuid_to_str(user_id))
        .bind(media_type.as_str())
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Everything the user is currently watching, most recent first
    pub async fn list_watching(&self, user_id: Uuid, limit: i64) -> Result<Vec<LibraryItemRecord>> {
        let records = sqlx::query_as::<_, LibraryItemRecord>(&format!(
            "{} WHERE p.user_id = ? AND p.status = ? ORDER BY p.updated_at DESC LIMIT ?",
            LIBRARY_SELECT
        ))
        .bind(uuid_to_str(user_id))
        .bind(WatchStatus::Watching.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// `(media_item_id, tmdb_id)` of shows in `watching`, optionally narrowed to one show
    pub async fn watching_shows(
        &self,
        user_id: Uuid,
        tmdb_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT m.id, m.tmdb_id
            FROM user_progress p
            INNER JOIN media_items m ON m.id = p.media_item_id
            WHERE p.user_id = ? AND p.status = ? AND m.type = ?
              AND (? IS NULL OR m.tmdb_id = ?)
            ORDER BY p.updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(WatchStatus::Watching.as_str())
        .bind(MediaType::Tv.as_str())
        .bind(tmdb_id)
        .bind(tmdb_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_status_roundtrip() {
        for status in [
            WatchStatus::PlanToWatch,
            WatchStatus::Watching,
            WatchStatus::Completed,
            WatchStatus::Dropped,
        ] {
            assert_eq!(WatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WatchStatus::parse("listened"), None);
    }

    #[test]
    fn test_watch_status_deserializes_snake_case() {
        let status: WatchStatus = serde_json::from_str("\"plan_to_watch\"").unwrap();
        assert_eq!(status, WatchStatus::PlanToWatch);
    }
}
