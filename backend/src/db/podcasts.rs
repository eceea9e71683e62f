//! Podcasts, their episodes, and per-user listening status
//!
//! A podcast may be known by its iTunes collection id, its ListenNotes id,
//! or both. Upserts match on whichever external id is present so the two
//! catalogs converge on a single row.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{json_to_vec, now_iso8601, uuid_to_str, vec_to_json};

/// Listening status for a podcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenStatus {
    PlanToListen,
    Listening,
    Listened,
    Dropped,
}

impl ListenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenStatus::PlanToListen => "plan_to_listen",
            ListenStatus::Listening => "listening",
            ListenStatus::Listened => "listened",
            ListenStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan_to_listen" => Some(ListenStatus::PlanToListen),
            "listening" => Some(ListenStatus::Listening),
            "listened" => Some(ListenStatus::Listened),
            "dropped" => Some(ListenStatus::Dropped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastRecord {
    pub id: i64,
    pub itunes_id: Option<String>,
    pub listen_notes_id: Option<String>,
    pub collection_name: String,
    pub artist_name: String,
    pub artwork_url: Option<String>,
    pub feed_url: Option<String>,
    pub description: Option<String>,
    pub total_episodes: Option<i64>,
    pub listen_score: Option<i64>,
    pub genres: Vec<String>,
    pub last_refreshed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for PodcastRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let genres: String = row.try_get("genres")?;

        Ok(Self {
            id: row.try_get("id")?,
            itunes_id: row.try_get("itunes_id")?,
            listen_notes_id: row.try_get("listen_notes_id")?,
            collection_name: row.try_get("collection_name")?,
            artist_name: row.try_get("artist_name")?,
            artwork_url: row.try_get("artwork_url")?,
            feed_url: row.try_get("feed_url")?,
            description: row.try_get("description")?,
            total_episodes: row.try_get("total_episodes")?,
            listen_score: row.try_get("listen_score")?,
            genres: json_to_vec(&genres),
            last_refreshed_at: row.try_get("last_refreshed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpsertPodcast {
    pub itunes_id: Option<String>,
    pub listen_notes_id: Option<String>,
    pub collection_name: String,
    pub artist_name: String,
    pub artwork_url: Option<String>,
    pub feed_url: Option<String>,
    pub description: Option<String>,
    pub total_episodes: Option<i64>,
    pub listen_score: Option<i64>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PodcastEpisodeRecord {
    pub id: i64,
    pub podcast_id: i64,
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct UpsertPodcastEpisode {
    pub podcast_id: i64,
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PodcastProgressRecord {
    pub id: i64,
    pub user_id: String,
    pub podcast_id: i64,
    pub status: String,
    pub progress: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PodcastLibraryRecord {
    pub podcast: PodcastRecord,
    pub status: String,
    pub progress: i64,
}

const PODCAST_COLUMNS: &str = "pc.id, pc.itunes_id, pc.listen_notes_id, pc.collection_name, \
    pc.artist_name, pc.artwork_url, pc.feed_url, pc.description, pc.total_episodes, \
    pc.listen_score, pc.genres, pc.last_refreshed_at, pc.created_at, pc.updated_at";

pub struct PodcastRepository {
    pool: SqlitePool,
}

impl PodcastRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<PodcastRecord>> {
        let record = sqlx::query_as::<_, PodcastRecord>(&format!(
            "SELECT {} FROM podcasts pc WHERE pc.id = ?",
            PODCAST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_itunes_id(&self, itunes_id: &str) -> Result<Option<PodcastRecord>> {
        let record = sqlx::query_as::<_, PodcastRecord>(&format!(
            "SELECT {} FROM podcasts pc WHERE pc.itunes_id = ?",
            PODCAST_COLUMNS
        ))
        .bind(itunes_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Resolve a path id that may be a local id, an iTunes id or a ListenNotes id
    pub async fn find_by_any_id(&self, id: &str) -> Result<Option<PodcastRecord>> {
        let local_id = if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            id.parse::<i64>().ok()
        } else {
            None
        };

        let record = sqlx::query_as::<_, PodcastRecord>(&format!(
            r#"
            SELECT {} FROM podcasts pc
            WHERE pc.id = ? OR pc.itunes_id = ? OR pc.listen_notes_id = ?
            ORDER BY CASE WHEN pc.id = ? THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            PODCAST_COLUMNS
        ))
        .bind(local_id)
        .bind(id)
        .bind(id)
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or refresh a podcast matched by either external id.
    ///
    /// Optional fields missing from the incoming payload keep their stored
    /// value, so an iTunes refresh does not erase ListenNotes data.
    pub async fn upsert(&self, input: &UpsertPodcast) -> Result<i64> {
        if input.itunes_id.is_none() && input.listen_notes_id.is_none() {
            anyhow::bail!("Podcast has neither an iTunes nor a ListenNotes id");
        }

        let now = now_iso8601();
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM podcasts WHERE itunes_id = ? OR listen_notes_id = ? LIMIT 1",
        )
        .bind(&input.itunes_id)
        .bind(&input.listen_notes_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                r#"
                UPDATE podcasts SET
                    itunes_id = COALESCE(?, itunes_id),
                    listen_notes_id = COALESCE(?, listen_notes_id),
                    collection_name = ?,
                    artist_name = ?,
                    artwork_url = COALESCE(?, artwork_url),
                    feed_url = COALESCE(?, feed_url),
                    description = COALESCE(?, description),
                    total_episodes = COALESCE(?, total_episodes),
                    listen_score = COALESCE(?, listen_score),
                    genres = CASE WHEN ? = '[]' THEN genres ELSE ? END,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.itunes_id)
            .bind(&input.listen_notes_id)
            .bind(&input.collection_name)
            .bind(&input.artist_name)
            .bind(&input.artwork_url)
            .bind(&input.feed_url)
            .bind(&input.description)
            .bind(input.total_episodes)
            .bind(input.listen_score)
            .bind(vec_to_json(&input.genres))
            .bind(vec_to_json(&input.genres))
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update podcast")?;

            return Ok(id);
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO podcasts (
                itunes_id, listen_notes_id, collection_name, artist_name, artwork_url,
                feed_url, description, total_episodes, listen_score, genres,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&input.itunes_id)
        .bind(&input.listen_notes_id)
        .bind(&input.collection_name)
        .bind(&input.artist_name)
        .bind(&input.artwork_url)
        .bind(&input.feed_url)
        .bind(&input.description)
        .bind(input.total_episodes)
        .bind(input.listen_score)
        .bind(vec_to_json(&input.genres))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert podcast")?;

        Ok(id)
    }

    /// Record a feed refresh, taking the feed-level description when present
    pub async fn mark_refreshed(&self, podcast_id: i64, description: Option<&str>) -> Result<()> {
        let now = now_iso8601();
        sqlx::query(
            r#"
            UPDATE podcasts SET
                description = COALESCE(?, description),
                last_refreshed_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(description)
        .bind(&now)
        .bind(&now)
        .bind(podcast_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or refresh an episode keyed by `(podcast, guid)`
    pub async fn upsert_episode(&self, input: &UpsertPodcastEpisode) -> Result<i64> {
        let now = now_iso8601();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO podcast_episodes (
                podcast_id, guid, title, description, pub_date, audio_url,
                duration_seconds, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (podcast_id, guid) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                pub_date = excluded.pub_date,
                audio_url = excluded.audio_url,
                duration_seconds = excluded.duration_seconds,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(input.podcast_id)
        .bind(&input.guid)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.pub_date)
        .bind(&input.audio_url)
        .bind(input.duration_seconds)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Newest episodes first
    pub async fn list_episodes(&self, podcast_id: i64, limit: i64) -> Result<Vec<PodcastEpisodeRecord>> {
        let records = sqlx::query_as::<_, PodcastEpisodeRecord>(
            r#"
            SELECT id, podcast_id, guid, title, description, pub_date, audio_url,
                   duration_seconds, created_at, updated_at
            FROM podcast_episodes
            WHERE podcast_id = ?
            ORDER BY pub_date DESC
            LIMIT ?
            "#,
        )
        .bind(podcast_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_progress(
        &self,
        user_id: Uuid,
        podcast_id: i64,
    ) -> Result<Option<PodcastProgressRecord>> {
        let record = sqlx::query_as::<_, PodcastProgressRecord>(
            r#"
            SELECT id, user_id, podcast_id, status, progress, created_at, updated_at
            FROM user_podcast_progress
            WHERE user_id = ? AND podcast_id = ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(podcast_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn upsert_progress(
        &self,
        user_id: Uuid,
        podcast_id: i64,
        status: ListenStatus,
        progress: i64,
    ) -> Result<PodcastProgressRecord> {
        let now = now_iso8601();

        let record = sqlx::query_as::<_, PodcastProgressRecord>(
            r#"
            INSERT INTO user_podcast_progress (user_id, podcast_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, podcast_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                updated_at = excluded.updated_at
            RETURNING id, user_id, podcast_id, status, progress, created_at, updated_at
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(podcast_id)
        .bind(status.as_str())
        .bind(progress)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list_library(&self, user_id: Uuid, status: &str) -> Result<Vec<PodcastLibraryRecord>> {
        use sqlx::{FromRow, Row};

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, p.status AS progress_status, p.progress
            FROM user_podcast_progress p
            INNER JOIN podcasts pc ON pc.id = p.podcast_id
            WHERE p.user_id = ? AND p.status = ?
            ORDER BY p.updated_at DESC
            "#,
            PODCAST_COLUMNS
        ))
        .bind(uuid_to_str(user_id))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PodcastLibraryRecord> {
                Ok(PodcastLibraryRecord {
                    podcast: PodcastRecord::from_row(row)?,
                    status: row.try_get("progress_status")?,
                    progress: row.try_get("progress")?,
                })
            })
            .collect()
    }
}
