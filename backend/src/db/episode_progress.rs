//! Per-user watched flags for individual episodes

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{bool_to_int, int_to_bool, now_iso8601, placeholders, uuid_to_str};

/// The first episode of a show the user has not watched yet
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NextEpisodeRecord {
    pub episode_id: i64,
    pub episode_name: Option<String>,
    pub episode_number: i64,
    pub season_number: i64,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub vote_average: Option<i64>,
}

pub struct EpisodeProgressRepository {
    pool: SqlitePool,
}

impl EpisodeProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the watched flag for one episode.
    ///
    /// `at` overrides the row's `updated_at` (used when replaying remote
    /// history); `None` means now.
    pub async fn set_watched(
        &self,
        user_id: Uuid,
        episode_id: i64,
        watched: bool,
        at: Option<&str>,
    ) -> Result<()> {
        let now = now_iso8601();
        let updated_at = at.unwrap_or(&now);

        sqlx::query(
            r#"
            INSERT INTO episode_progress (user_id, episode_id, watched, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, episode_id) DO UPDATE SET
                watched = excluded.watched,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(episode_id)
        .bind(bool_to_int(watched))
        .bind(&now)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Watched flags for the given episodes. Episodes without a row are absent
    /// from the map.
    pub async fn statuses(&self, user_id: Uuid, episode_ids: &[i64]) -> Result<HashMap<i64, bool>> {
        if episode_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT episode_id, watched FROM episode_progress WHERE user_id = ? AND episode_id IN ({})",
            placeholders(episode_ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64, i64)>(&sql).bind(uuid_to_str(user_id));
        for id in episode_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(episode_id, watched)| (episode_id, int_to_bool(watched)))
            .collect())
    }

    /// Lowest `(season, episode)` of a show without a `watched = 1` row for
    /// this user.
    pub async fn next_unwatched(
        &self,
        user_id: Uuid,
        media_item_id: i64,
    ) -> Result<Option<NextEpisodeRecord>> {
        let record = sqlx::query_as::<_, NextEpisodeRecord>(
            r#"
            SELECT e.id AS episode_id, e.name AS episode_name, e.episode_number,
                   s.season_number, e.overview, e.still_path, e.air_date, e.vote_average
            FROM episodes e
            INNER JOIN seasons s ON s.id = e.season_id
            LEFT JOIN episode_progress ep
                ON ep.episode_id = e.id AND ep.user_id = ?
            WHERE s.media_item_id = ?
              AND (ep.watched IS NULL OR ep.watched = 0)
            ORDER BY s.season_number ASC, e.episode_number ASC
            LIMIT 1
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(media_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
