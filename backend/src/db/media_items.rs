//! Movies and TV shows mirrored from TMDB
//!
//! A media item is identified by `(tmdb_id, type)`; everything else is
//! denormalized metadata that is overwritten on each upsert.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::now_iso8601;

/// Kind of catalog entry a user can track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Book,
    Ebook,
    Podcast,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Book => "book",
            MediaType::Ebook => "ebook",
            MediaType::Podcast => "podcast",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaType::Movie),
            "tv" => Some(MediaType::Tv),
            "book" => Some(MediaType::Book),
            "ebook" => Some(MediaType::Ebook),
            "podcast" => Some(MediaType::Podcast),
            _ => None,
        }
    }

    /// Movies and shows live in `media_items`; the rest have their own tables
    pub fn is_screen(&self) -> bool {
        matches!(self, MediaType::Movie | MediaType::Tv)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemRecord {
    pub id: i64,
    pub tmdb_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub media_type: String,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub last_air_date: Option<String>,
    pub status: Option<String>,
    /// TMDB vote average multiplied by ten
    pub vote_average: Option<i64>,
    pub vote_count: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for inserting or refreshing a media item
#[derive(Debug, Clone)]
pub struct UpsertMediaItem {
    pub tmdb_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub last_air_date: Option<String>,
    pub status: Option<String>,
    pub vote_average: Option<i64>,
    pub vote_count: Option<i64>,
}

const COLUMNS: &str = "id, tmdb_id, type, title, original_title, overview, poster_path, \
    backdrop_path, release_date, last_air_date, status, vote_average, vote_count, \
    created_at, updated_at";

pub struct MediaItemRepository {
    pool: SqlitePool,
}

impl MediaItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<MediaItemRecord>> {
        let record = sqlx::query_as::<_, MediaItemRecord>(&format!(
            "SELECT {} FROM media_items WHERE id = ?",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Look up by the catalog identity key
    pub async fn find_by_tmdb(
        &self,
        tmdb_id: i64,
        media_type: MediaType,
    ) -> Result<Option<MediaItemRecord>> {
        let record = sqlx::query_as::<_, MediaItemRecord>(&format!(
            "SELECT {} FROM media_items WHERE tmdb_id = ? AND type = ?",
            COLUMNS
        ))
        .bind(tmdb_id)
        .bind(media_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or refresh a media item, returning its local id.
    ///
    /// Identity columns are the conflict key; every other column takes the
    /// incoming value.
    pub async fn upsert(&self, input: &UpsertMediaItem) -> Result<i64> {
        let now = now_iso8601();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO media_items (
                tmdb_id, type, title, original_title, overview, poster_path,
                backdrop_path, release_date, last_air_date, status, vote_average,
                vote_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tmdb_id, type) DO UPDATE SET
                title = excluded.title,
                original_title = excluded.original_title,
                overview = excluded.overview,
                poster_path = excluded.poster_path,
                backdrop_path = excluded.backdrop_path,
                release_date = excluded.release_date,
                last_air_date = excluded.last_air_date,
                status = excluded.status,
                vote_average = excluded.vote_average,
                vote_count = excluded.vote_count,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(input.tmdb_id)
        .bind(input.media_type.as_str())
        .bind(&input.title)
        .bind(&input.original_title)
        .bind(&input.overview)
        .bind(&input.poster_path)
        .bind(&input.backdrop_path)
        .bind(&input.release_date)
        .bind(&input.last_air_date)
        .bind(&input.status)
        .bind(input.vote_average)
        .bind(input.vote_count)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
