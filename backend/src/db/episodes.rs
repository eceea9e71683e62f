//! Episode database repository

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

/// Episode record from database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    pub id: i64,
    pub tmdb_id: i64,
    pub season_id: i64,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub vote_average: Option<i64>,
    pub vote_count: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for inserting or refreshing an episode
#[derive(Debug, Clone)]
pub struct UpsertEpisode {
    pub tmdb_id: i64,
    pub season_id: i64,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub vote_average: Option<i64>,
    pub vote_count: Option<i64>,
}

const COLUMNS: &str = "e.id, e.tmdb_id, e.season_id, e.episode_number, e.name, e.overview, \
    e.still_path, e.air_date, e.vote_average, e.vote_count, e.created_at, e.updated_at";

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<EpisodeRecord>> {
        let record = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "SELECT {} FROM episodes e WHERE e.id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or refresh an episode keyed by its TMDB id, returning the local id
    pub async fn upsert(&self, input: &UpsertEpisode) -> Result<i64> {
        let now = now_iso8601();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO episodes (
                tmdb_id, season_id, episode_number, name, overview, still_path,
                air_date, vote_average, vote_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                episode_number = excluded.episode_number,
                name = excluded.name,
                overview = excluded.overview,
                still_path = excluded.still_path,
                air_date = excluded.air_date,
                vote_average = excluded.vote_average,
                vote_count = excluded.vote_count,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(input.tmdb_id)
        .bind(input.season_id)
        .bind(input.episode_number)
        .bind(&input.name)
        .bind(&input.overview)
        .bind(&input.still_path)
        .bind(&input.air_date)
        .bind(input.vote_average)
        .bind(input.vote_count)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Batch upsert episodes, returning how many were written
    pub async fn upsert_batch(&self, episodes: &[UpsertEpisode]) -> Result<usize> {
        let mut count = 0;
        for ep in episodes {
            self.upsert(ep).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn find_by_number(
        &self,
        season_id: i64,
        episode_number: i64,
    ) -> Result<Option<EpisodeRecord>> {
        let record = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "SELECT {} FROM episodes e WHERE e.season_id = ? AND e.episode_number = ?",
            COLUMNS
        ))
        .bind(season_id)
        .bind(episode_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Get all episodes of a season in airing order
    pub async fn list_by_season(&self, season_id: i64) -> Result<Vec<EpisodeRecord>> {
        let records = sqlx::query_as::<_, EpisodeRecord>(&format!(
            "SELECT {} FROM episodes e WHERE e.season_id = ? ORDER BY e.episode_number ASC",
            COLUMNS
        ))
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Ids of every local episode belonging to a show
    pub async fn list_ids_by_media_item(&self, media_item_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT e.id
            FROM episodes e
            INNER JOIN seasons s ON s.id = e.season_id
            WHERE s.media_item_id = ?
            ORDER BY s.season_number ASC, e.episode_number ASC
            "#,
        )
        .bind(media_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
