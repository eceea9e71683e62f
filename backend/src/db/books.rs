//! Books mirrored from Google Books, plus per-user reading status

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{bool_to_int, json_to_vec, now_iso8601, uuid_to_str, vec_to_json};

/// Reading status for a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    PlanToRead,
    Reading,
    Completed,
    Dropped,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::PlanToRead => "plan_to_read",
            ReadStatus::Reading => "reading",
            ReadStatus::Completed => "completed",
            ReadStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan_to_read" => Some(ReadStatus::PlanToRead),
            "reading" => Some(ReadStatus::Reading),
            "completed" => Some(ReadStatus::Completed),
            "dropped" => Some(ReadStatus::Dropped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: i64,
    pub google_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i64>,
    pub categories: Vec<String>,
    /// Google average rating multiplied by ten
    pub average_rating: Option<i64>,
    pub ratings_count: Option<i64>,
    pub is_ebook: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for BookRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let authors: String = row.try_get("authors")?;
        let categories: String = row.try_get("categories")?;

        Ok(Self {
            id: row.try_get("id")?,
            google_id: row.try_get("google_id")?,
            title: row.try_get("title")?,
            authors: json_to_vec(&authors),
            description: row.try_get("description")?,
            thumbnail: row.try_get("thumbnail")?,
            published_date: row.try_get("published_date")?,
            page_count: row.try_get("page_count")?,
            categories: json_to_vec(&categories),
            average_rating: row.try_get("average_rating")?,
            ratings_count: row.try_get("ratings_count")?,
            is_ebook: row.try_get("is_ebook")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpsertBook {
    pub google_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i64>,
    pub categories: Vec<String>,
    pub average_rating: Option<i64>,
    pub ratings_count: Option<i64>,
    pub is_ebook: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookProgressRecord {
    pub id: i64,
    pub user_id: String,
    pub book_id: i64,
    pub status: String,
    pub progress: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A reading-list entry joined with its book
#[derive(Debug, Clone)]
pub struct BookLibraryRecord {
    pub book: BookRecord,
    pub status: String,
    pub progress: i64,
}

const BOOK_COLUMNS: &str = "b.id, b.google_id, b.title, b.authors, b.description, b.thumbnail, \
    b.published_date, b.page_count, b.categories, b.average_rating, b.ratings_count, \
    b.is_ebook, b.created_at, b.updated_at";

pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_google_id(&self, google_id: &str) -> Result<Option<BookRecord>> {
        let record = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {} FROM books b WHERE b.google_id = ?",
            BOOK_COLUMNS
        ))
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or refresh a book keyed by its Google volume id
    pub async fn upsert(&self, input: &UpsertBook) -> Result<i64> {
        let now = now_iso8601();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO books (
                google_id, title, authors, description, thumbnail, published_date,
                page_count, categories, average_rating, ratings_count, is_ebook,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (google_id) DO UPDATE SET
                title = excluded.title,
                authors = excluded.authors,
                description = excluded.description,
                thumbnail = excluded.thumbnail,
                published_date = excluded.published_date,
                page_count = excluded.page_count,
                categories = excluded.categories,
                average_rating = excluded.average_rating,
                ratings_count = excluded.ratings_count,
                is_ebook = excluded.is_ebook,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&input.google_id)
        .bind(&input.title)
        .bind(vec_to_json(&input.authors))
        .bind(&input.description)
        .bind(&input.thumbnail)
        .bind(&input.published_date)
        .bind(input.page_count)
        .bind(vec_to_json(&input.categories))
        .bind(input.average_rating)
        .bind(input.ratings_count)
        .bind(bool_to_int(input.is_ebook))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_progress(&self, user_id: Uuid, book_id: i64) -> Result<Option<BookProgressRecord>> {
        let record = sqlx::query_as::<_, BookProgressRecord>(
            r#"
            SELECT id, user_id, book_id, status, progress, created_at, updated_at
            FROM user_book_progress
            WHERE user_id = ? AND book_id = ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn upsert_progress(
        &self,
        user_id: Uuid,
        book_id: i64,
        status: ReadStatus,
        progress: i64,
    ) -> Result<BookProgressRecord> {
        let now = now_iso8601();

        let record = sqlx::query_as::<_, BookProgressRecord>(
            r#"
            INSERT INTO user_book_progress (user_id, book_id, status, progress, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, book_id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                updated_at = excluded.updated_at
            RETURNING id, user_id, book_id, status, progress, created_at, updated_at
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(book_id)
        .bind(status.as_str())
        .bind(progress)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Reading list for one status, split by print vs. ebook
    pub async fn list_library(
        &self,
        user_id: Uuid,
        is_ebook: bool,
        status: &str,
    ) -> Result<Vec<BookLibraryRecord>> {
        use sqlx::{FromRow, Row};

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, p.status AS progress_status, p.progress
            FROM user_book_progress p
            INNER JOIN books b ON b.id = p.book_id
            WHERE p.user_id = ? AND b.is_ebook = ? AND p.status = ?
            ORDER BY p.updated_at DESC
            "#,
            BOOK_COLUMNS
        ))
        .bind(uuid_to_str(user_id))
        .bind(bool_to_int(is_ebook))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<BookLibraryRecord> {
                Ok(BookLibraryRecord {
                    book: BookRecord::from_row(row)?,
                    status: row.try_get("progress_status")?,
                    progress: row.try_get("progress")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_status_roundtrip() {
        for status in [
            ReadStatus::PlanToRead,
            ReadStatus::Reading,
            ReadStatus::Completed,
            ReadStatus::Dropped,
        ] {
            assert_eq!(ReadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReadStatus::parse("watching"), None);
    }
}
