//! Database connection and repositories

pub mod books;
pub mod connections;
pub mod episode_progress;
pub mod episodes;
pub mod friendships;
pub mod genres;
pub mod media_items;
pub mod podcasts;
pub mod progress;
pub mod ratings;
pub mod seasons;
pub mod sqlite_helpers;
pub mod users;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use books::{
    BookLibraryRecord, BookProgressRecord, BookRecord, BookRepository, ReadStatus, UpsertBook,
};
pub use connections::{
    AccountConnectionRecord, ConnectionRepository, TRAKT_PROVIDER, UpsertConnection,
};
pub use episode_progress::{EpisodeProgressRepository, NextEpisodeRecord};
pub use episodes::{EpisodeRecord, EpisodeRepository, UpsertEpisode};
pub use friendships::{FriendshipRecord, FriendshipRepository, FriendshipStatus, FriendshipWithUser};
pub use genres::GenreRepository;
pub use media_items::{MediaItemRecord, MediaItemRepository, MediaType, UpsertMediaItem};
pub use podcasts::{
    ListenStatus, PodcastEpisodeRecord, PodcastLibraryRecord, PodcastProgressRecord,
    PodcastRecord, PodcastRepository, UpsertPodcast, UpsertPodcastEpisode,
};
pub use progress::{LibraryItemRecord, ProgressRepository, UserProgressRecord, WatchStatus};
pub use ratings::{RatingRecord, RatingRepository};
pub use seasons::{SeasonRecord, SeasonRepository, UpsertSeason};
pub use users::{CreateUser, UserRecord, UserSummary, UsersRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Open (creating if needed) the SQLite database at `url`.
    ///
    /// Accepts either a `sqlite:` URL or a bare file path.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid database URL: {}", url))?
        } else {
            if let Some(parent) = Path::new(url).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            SqliteConnectOptions::new().filename(url)
        };
        let options = options.create_if_missing(true).foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Ok(Self { pool })
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Each SQLite connection to `:memory:` is its own database, so the pool
    /// is pinned to a single connection that never expires.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get a media items (movies / TV shows) repository
    pub fn media_items(&self) -> MediaItemRepository {
        MediaItemRepository::new(self.pool.clone())
    }

    pub fn seasons(&self) -> SeasonRepository {
        SeasonRepository::new(self.pool.clone())
    }

    pub fn episodes(&self) -> EpisodeRepository {
        EpisodeRepository::new(self.pool.clone())
    }

    /// Get a user progress repository (movie / show status)
    pub fn progress(&self) -> ProgressRepository {
        ProgressRepository::new(self.pool.clone())
    }

    /// Get an episode progress repository (per-episode watched flags)
    pub fn episode_progress(&self) -> EpisodeProgressRepository {
        EpisodeProgressRepository::new(self.pool.clone())
    }

    pub fn ratings(&self) -> RatingRepository {
        RatingRepository::new(self.pool.clone())
    }

    pub fn books(&self) -> BookRepository {
        BookRepository::new(self.pool.clone())
    }

    pub fn podcasts(&self) -> PodcastRepository {
        PodcastRepository::new(self.pool.clone())
    }

    pub fn friendships(&self) -> FriendshipRepository {
        FriendshipRepository::new(self.pool.clone())
    }

    /// Get a profile genre interests repository
    pub fn genres(&self) -> GenreRepository {
        GenreRepository::new(self.pool.clone())
    }

    /// Get an account connections repository (OAuth tokens)
    pub fn connections(&self) -> ConnectionRepository {
        ConnectionRepository::new(self.pool.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("traktdb.db");
        let path = path.to_str().unwrap();

        let db = Database::connect(path).await.unwrap();
        db.migrate().await.unwrap();
        db.users()
            .create(CreateUser {
                email: "persist@example.com".to_string(),
                name: "Persist".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        db.pool().close().await;

        let reopened = Database::connect(path).await.unwrap();
        reopened.migrate().await.unwrap();
        let user = reopened
            .users()
            .get_by_email("persist@example.com")
            .await
            .unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::connect_in_memory().await.unwrap();
        let result = db
            .progress()
            .upsert(Uuid::new_v4(), 1, WatchStatus::Watching, 0)
            .await;
        assert!(result.is_err());
    }
}
