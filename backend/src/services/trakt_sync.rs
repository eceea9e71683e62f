//! Trakt → local reconciliation
//!
//! A sync pass replays the user's Trakt watched history, watchlist and
//! ratings into local progress tables, backfilling catalog rows from TMDB as
//! it goes. Collections run in a fixed order; within a collection pages are
//! read until an empty or short page. A failed page ends that collection and
//! the pass moves on. A failed item is logged and skipped.
//!
//! Within one pass each season is fetched from the catalog at most once
//! after a successful fetch; a failed fetch is retried by the next episode
//! of that season.
//!
//! History episodes are matched by (show, season, number), so entries whose
//! episode carries no TMDB id are still applied.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::sqlite_helpers::normalize_timestamp;
use crate::db::{Database, MediaType, TRAKT_PROVIDER, WatchStatus};

use super::catalog::{ShowCatalog, ensure_media_item, upsert_episodes, upsert_season_with_episodes};
use super::encryption::TokenCipher;
use super::trakt::{TraktApi, TraktCollection, TraktHistoryItem, TraktMedia, TraktRatingItem};

/// Items requested per Trakt page
pub const PAGE_LIMIT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Trakt account is not connected")]
    NotConnected,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Per-collection outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    /// Pages fetched successfully
    pub pages: u32,
    /// Items written locally
    pub applied: usize,
    /// Items that could not be resolved to a catalog entry
    pub skipped: usize,
    /// Items that hit an error while being written
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub movies: CollectionReport,
    pub episodes: CollectionReport,
    pub watchlist_movies: CollectionReport,
    pub watchlist_shows: CollectionReport,
    pub rating_movies: CollectionReport,
    pub rating_shows: CollectionReport,
}

/// How one item was handled
enum Outcome {
    Applied,
    Skipped,
}

impl CollectionReport {
    fn record(&mut self, result: Result<Outcome>, what: &str) {
        match result {
            Ok(Outcome::Applied) => self.applied += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(e) => {
                warn!(item = what, error = %e, "Failed to apply Trakt item");
                self.failed += 1;
            }
        }
    }
}

/// A page with fewer than [`PAGE_LIMIT`] items is the last one
fn is_last_page(len: usize) -> bool {
    len < PAGE_LIMIT as usize
}

/// Per-run lookup state for the episode cascade
#[derive(Default)]
struct EpisodeCache {
    /// show tmdb id → local media item (None when unresolvable)
    shows: HashMap<i64, Option<i64>>,
    /// (show tmdb id, season number) fetched successfully this run
    fetched_seasons: HashSet<(i64, i64)>,
}

pub struct TraktSyncService {
    db: Database,
    trakt: Arc<dyn TraktApi>,
    catalog: Arc<dyn ShowCatalog>,
    cipher: TokenCipher,
}

impl TraktSyncService {
    pub fn new(db: Database, trakt: Arc<dyn TraktApi>, catalog: Arc<dyn ShowCatalog>, cipher: TokenCipher) -> Self {
        Self {
            db,
            trakt,
            catalog,
            cipher,
        }
    }

    async fn access_token(&self, user_id: Uuid) -> Result<String, SyncError> {
        let connection = self
            .db
            .connections()
            .get(user_id, TRAKT_PROVIDER)
            .await?
            .ok_or(SyncError::NotConnected)?;

        Ok(self.cipher.open(&connection.access_token)?)
    }

    /// Run a full reconciliation pass for one user
    pub async fn sync_all(&self, user_id: Uuid) -> Result<SyncReport, SyncError> {
        let token = self.access_token(user_id).await?;
        info!(user_id = %user_id, "Starting Trakt sync");

        let mut report = SyncReport::default();

        self.sync_watched_movies(user_id, &token, &mut report.movies).await;
        self.sync_watched_episodes(user_id, &token, &mut report.episodes)
            .await;
        self.sync_watchlist(user_id, &token, TraktCollection::Movies, &mut report.watchlist_movies)
            .await;
        self.sync_watchlist(user_id, &token, TraktCollection::Shows, &mut report.watchlist_shows)
            .await;
        self.sync_ratings(user_id, &token, TraktCollection::Movies, &mut report.rating_movies)
            .await;
        self.sync_ratings(user_id, &token, TraktCollection::Shows, &mut report.rating_shows)
            .await;

        self.db
            .connections()
            .touch_synced(user_id, TRAKT_PROVIDER)
            .await?;

        info!(
            user_id = %user_id,
            movies = report.movies.applied,
            episodes = report.episodes.applied,
            watchlist = report.watchlist_movies.applied + report.watchlist_shows.applied,
            ratings = report.rating_movies.applied + report.rating_shows.applied,
            "Trakt sync complete"
        );

        Ok(report)
    }

    async fn sync_watched_movies(&self, user_id: Uuid, token: &str, report: &mut CollectionReport) {
        let mut page = 1;
        loop {
            let items = match self
                .trakt
                .history(token, TraktCollection::Movies, page, PAGE_LIMIT)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(page, error = %e, "Failed to fetch Trakt movie history page");
                    break;
                }
            };
            report.pages += 1;

            for item in &items {
                let result = self.apply_watched_movie(user_id, item).await;
                report.record(result, "history/movie");
            }

            if is_last_page(items.len()) {
                break;
            }
            page += 1;
        }
    }

    async fn apply_watched_movie(&self, user_id: Uuid, item: &TraktHistoryItem) -> Result<Outcome> {
        let Some(tmdb_id) = item.movie.as_ref().and_then(|m| m.ids.tmdb) else {
            return Ok(Outcome::Skipped);
        };
        let Some(media_item_id) = ensure_media_item(&self.db, self.catalog.as_ref(), tmdb_id, MediaType::Movie).await
        else {
            return Ok(Outcome::Skipped);
        };

        let watched_at = normalize_timestamp(Some(&item.watched_at));
        self.db
            .progress()
            .mark_completed(user_id, media_item_id, &watched_at)
            .await?;

        Ok(Outcome::Applied)
    }

    async fn sync_watched_episodes(&self, user_id: Uuid, token: &str, report: &mut CollectionReport) {
        let mut cache = EpisodeCache::default();
        let mut page = 1;
        loop {
            let items = match self
                .trakt
                .history(token, TraktCollection::Episodes, page, PAGE_LIMIT)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(page, error = %e, "Failed to fetch Trakt episode history page");
                    break;
                }
            };
            report.pages += 1;

            for item in &items {
                let result = self.apply_watched_episode(user_id, item, &mut cache).await;
                report.record(result, "history/episode");
            }

            if is_last_page(items.len()) {
                break;
            }
            page += 1;
        }
    }

    /// Show → season → episode → progress, fetching missing levels from the catalog
    async fn apply_watched_episode(
        &self,
        user_id: Uuid,
        item: &TraktHistoryItem,
        cache: &mut EpisodeCache,
    ) -> Result<Outcome> {
        let (Some(show_tmdb_id), Some(episode)) =
            (item.show.as_ref().and_then(|s| s.ids.tmdb), item.episode.as_ref())
        else {
            return Ok(Outcome::Skipped);
        };

        let media_item_id = match cache.shows.get(&show_tmdb_id) {
            Some(cached) => *cached,
            None => {
                let resolved = ensure_media_item(&self.db, self.catalog.as_ref(), show_tmdb_id, MediaType::Tv).await;
                cache.shows.insert(show_tmdb_id, resolved);
                resolved
            }
        };
        let Some(media_item_id) = media_item_id else {
            return Ok(Outcome::Skipped);
        };

        let season_key = (show_tmdb_id, episode.season);
        let season_id = match self
            .db
            .seasons()
            .find_by_number(media_item_id, episode.season)
            .await?
        {
            Some(season) => season.id,
            None => {
                if cache.fetched_seasons.contains(&season_key) {
                    // Already fetched this run and still missing
                    return Ok(Outcome::Skipped);
                }
                debug!(show_tmdb_id, season = episode.season, "Season missing locally, fetching");
                let season = self.catalog.season(show_tmdb_id, episode.season).await?;
                cache.fetched_seasons.insert(season_key);
                upsert_season_with_episodes(&self.db, &season, media_item_id).await?
            }
        };

        let episodes = self.db.episodes();
        let episode_id = match episodes.find_by_number(season_id, episode.number).await? {
            Some(row) => row.id,
            None => {
                if cache.fetched_seasons.contains(&season_key) {
                    return Ok(Outcome::Skipped);
                }
                debug!(show_tmdb_id, season = episode.season, episode = episode.number, "Episode missing locally, fetching season");
                let season = self.catalog.season(show_tmdb_id, episode.season).await?;
                cache.fetched_seasons.insert(season_key);
                if let Some(ref fetched) = season.episodes {
                    upsert_episodes(&self.db, fetched, season_id).await?;
                }
                match episodes.find_by_number(season_id, episode.number).await? {
                    Some(row) => row.id,
                    None => return Ok(Outcome::Skipped),
                }
            }
        };

        let watched_at = normalize_timestamp(Some(&item.watched_at));
        self.db
            .episode_progress()
            .set_watched(user_id, episode_id, true, Some(&watched_at))
            .await?;

        // A show with watched episodes is at least in progress; never downgrade
        self.db
            .progress()
            .insert_if_absent(user_id, media_item_id, WatchStatus::Watching)
            .await?;

        Ok(Outcome::Applied)
    }

    async fn sync_watchlist(
        &self,
        user_id: Uuid,
        token: &str,
        collection: TraktCollection,
        report: &mut CollectionReport,
    ) {
        let mut page = 1;
        loop {
            let items = match self.trakt.watchlist(token, collection, page, PAGE_LIMIT).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(collection = collection.as_str(), page, error = %e, "Failed to fetch Trakt watchlist page");
                    break;
                }
            };
            report.pages += 1;

            for item in &items {
                let result = self
                    .apply_listed(user_id, collection, item.movie.as_ref(), item.show.as_ref(), &item.listed_at)
                    .await;
                report.record(result, "watchlist");
            }

            if is_last_page(items.len()) {
                break;
            }
            page += 1;
        }
    }

    /// Resolve the movie or show an entry refers to, depending on the collection
    async fn resolve_entry(
        &self,
        collection: TraktCollection,
        movie: Option<&TraktMedia>,
        show: Option<&TraktMedia>,
    ) -> Option<i64> {
        let (media, media_type) = match collection {
            TraktCollection::Movies => (movie, MediaType::Movie),
            _ => (show, MediaType::Tv),
        };
        let tmdb_id = media.and_then(|m| m.ids.tmdb)?;
        ensure_media_item(&self.db, self.catalog.as_ref(), tmdb_id, media_type).await
    }

    async fn apply_listed(
        &self,
        user_id: Uuid,
        collection: TraktCollection,
        movie: Option<&TraktMedia>,
        show: Option<&TraktMedia>,
        listed_at: &str,
    ) -> Result<Outcome> {
        let Some(media_item_id) = self.resolve_entry(collection, movie, show).await else {
            return Ok(Outcome::Skipped);
        };

        let listed_at = normalize_timestamp(Some(listed_at));
        self.db
            .progress()
            .apply_watchlist_entry(user_id, media_item_id, &listed_at)
            .await?;

        Ok(Outcome::Applied)
    }

    async fn apply_rating(
        &self,
        user_id: Uuid,
        collection: TraktCollection,
        item: &TraktRatingItem,
    ) -> Result<Outcome> {
        let Some(media_item_id) = self
            .resolve_entry(collection, item.movie.as_ref(), item.show.as_ref())
            .await
        else {
            return Ok(Outcome::Skipped);
        };

        let rated_at = normalize_timestamp(Some(&item.rated_at));
        self.db
            .ratings()
            .upsert(user_id, media_item_id, item.rating, &rated_at)
            .await?;

        Ok(Outcome::Applied)
    }

    async fn sync_ratings(
        &self,
        user_id: Uuid,
        token: &str,
        collection: TraktCollection,
        report: &mut CollectionReport,
    ) {
        let mut page = 1;
        loop {
            let items = match self.trakt.ratings(token, collection, page, PAGE_LIMIT).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(collection = collection.as_str(), page, error = %e, "Failed to fetch Trakt ratings page");
                    break;
                }
            };
            report.pages += 1;

            for item in &items {
                let result = self.apply_rating(user_id, collection, item).await;
                report.record(result, "rating");
            }

            if is_last_page(items.len()) {
                break;
            }
            page += 1;
        }
    }
}
