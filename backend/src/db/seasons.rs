//! Season database repository

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRecord {
    pub id: i64,
    pub tmdb_id: i64,
    pub media_item_id: i64,
    pub season_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episode_count: Option<i64>,
    pub vote_average: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct UpsertSeason {
    pub tmdb_id: i64,
    pub media_item_id: i64,
    pub season_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episode_count: Option<i64>,
    pub vote_average: Option<i64>,
}

pub struct SeasonRepository {
    pool: SqlitePool,
}

impl SeasonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a season keyed by its TMDB id, returning the local id
    pub async fn upsert(&self, input: &UpsertSeason) -> Result<i64> {
        let now = now_iso8601();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO seasons (
                tmdb_id, media_item_id, season_number, name, overview, poster_path,
                air_date, episode_count, vote_average, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                season_number = excluded.season_number,
                name = excluded.name,
                overview = excluded.overview,
                poster_path = excluded.poster_path,
                air_date = COALESCE(excluded.air_date, seasons.air_date),
                episode_count = COALESCE(excluded.episode_count, seasons.episode_count),
                vote_average = excluded.vote_average,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(input.tmdb_id)
        .bind(input.media_item_id)
        .bind(input.season_number)
        .bind(&input.name)
        .bind(&input.overview)
        .bind(&input.poster_path)
        .bind(&input.air_date)
        .bind(input.episode_count)
        .bind(input.vote_average)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Upsert a batch of seasons, returning how many were written
    pub async fn upsert_batch(&self, seasons: &[UpsertSeason]) -> Result<usize> {
        let mut count = 0;
        for season in seasons {
            self.upsert(season).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn find_by_number(
        &self,
        media_item_id: i64,
        season_number: i64,
    ) -> Result<Option<SeasonRecord>> {
        let record = sqlx::query_as::<_, SeasonRecord>(
            r#"
            SELECT id, tmdb_id, media_item_id, season_number, name, overview, poster_path,
                   air_date, episode_count, vote_average, created_at, updated_at
            FROM seasons
            WHERE media_item_id = ? AND season_number = ?
            "#,
        )
        .bind(media_item_id)
        .bind(season_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list_by_media_item(&self, media_item_id: i64) -> Result<Vec<SeasonRecord>> {
        let records = sqlx::query_as::<_, SeasonRecord>(
            r#"
            SELECT id, tmdb_id, media_item_id, season_number, name, overview, poster_path,
                   air_date, episode_count, vote_average, created_at, updated_at
            FROM seasons
            WHERE media_item_id = ?
            ORDER BY season_number ASC
            "#,
        )
        .bind(media_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
