//! Shared fixtures for the integration tests: in-memory fakes for the movie/TV
//! catalog and the user-scoped Trakt API, plus database seeding helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use uuid::Uuid;

use traktdb::db::{CreateUser, Database, TRAKT_PROVIDER, UpsertConnection};
use traktdb::services::ShowCatalog;
use traktdb::services::tmdb::{TmdbEpisode, TmdbMediaDetails, TmdbSeason};
use traktdb::services::trakt::{
    PushAction, TraktApi, TraktCalendarMovie, TraktCalendarShow, TraktCollection, TraktEpisode,
    TraktHistoryItem, TraktIds, TraktMedia, TraktRatingItem, TraktSyncPayload, TraktWatchlistItem,
};

// ============================================================================
// Database helpers
// ============================================================================

pub async fn create_user(db: &Database, email: &str) -> Uuid {
    let user = db
        .users()
        .create(CreateUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "not-a-hash".to_string(),
        })
        .await
        .unwrap();
    Uuid::parse_str(&user.id).unwrap()
}

/// Store a plaintext Trakt connection for `user_id`
pub async fn connect_trakt(db: &Database, user_id: Uuid, access_token: &str) {
    db.connections()
        .upsert(&UpsertConnection {
            user_id,
            provider: TRAKT_PROVIDER.to_string(),
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            provider_user_id: Some("tester".to_string()),
            provider_username: Some("tester".to_string()),
        })
        .await
        .unwrap();
}

// ============================================================================
// Catalog fake
// ============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    movies: HashMap<i64, TmdbMediaDetails>,
    shows: HashMap<i64, TmdbMediaDetails>,
    seasons: HashMap<(i64, i64), TmdbSeason>,
    /// Every `season` call, in order
    pub season_calls: Mutex<Vec<(i64, i64)>>,
    /// Remaining failures per `(show, season)` before `season` succeeds
    season_failures: Mutex<HashMap<(i64, i64), u32>>,
}

impl FakeCatalog {
    pub fn with_movie(mut self, tmdb_id: i64, title: &str) -> Self {
        self.movies.insert(
            tmdb_id,
            TmdbMediaDetails {
                id: tmdb_id,
                media_type: Some("movie".to_string()),
                title: Some(title.to_string()),
                release_date: Some("2020-01-01".to_string()),
                ..Default::default()
            },
        );
        self
    }

    /// A show whose seasons have the given episode counts, numbered from 1.
    ///
    /// Episode TMDB ids are `tmdb_id * 1000 + season * 100 + episode`.
    pub fn with_show(mut self, tmdb_id: i64, title: &str, episode_counts: &[i64]) -> Self {
        let mut summaries = Vec::new();
        for (index, count) in episode_counts.iter().enumerate() {
            let season_number = index as i64 + 1;
            let summary = TmdbSeason {
                id: tmdb_id * 10 + season_number,
                name: Some(format!("Season {}", season_number)),
                season_number,
                episode_count: Some(*count),
                ..Default::default()
            };
            let episodes = (1..=*count)
                .map(|n| TmdbEpisode {
                    id: tmdb_id * 1000 + season_number * 100 + n,
                    name: Some(format!("S{:02}E{:02}", season_number, n)),
                    episode_number: n,
                    season_number: Some(season_number),
                    show_id: Some(tmdb_id),
                    ..Default::default()
                })
                .collect();
            self.seasons.insert(
                (tmdb_id, season_number),
                TmdbSeason {
                    episodes: Some(episodes),
                    ..summary.clone()
                },
            );
            summaries.push(summary);
        }

        self.shows.insert(
            tmdb_id,
            TmdbMediaDetails {
                id: tmdb_id,
                media_type: Some("tv".to_string()),
                name: Some(title.to_string()),
                first_air_date: Some("2019-01-01".to_string()),
                seasons: Some(summaries),
                ..Default::default()
            },
        );
        self
    }

    /// Make the next `times` fetches of one season fail
    pub fn failing_season(self, tmdb_id: i64, season_number: i64, times: u32) -> Self {
        self.season_failures
            .lock()
            .unwrap()
            .insert((tmdb_id, season_number), times);
        self
    }

    pub fn season_call_count(&self) -> usize {
        self.season_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ShowCatalog for FakeCatalog {
    async fn movie(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        self.movies
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| anyhow!("movie {} not in fake catalog", tmdb_id))
    }

    async fn tv(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        self.shows
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| anyhow!("show {} not in fake catalog", tmdb_id))
    }

    async fn season(&self, tv_id: i64, season_number: i64) -> Result<TmdbSeason> {
        self.season_calls.lock().unwrap().push((tv_id, season_number));
        if let Some(remaining) = self.season_failures.lock().unwrap().get_mut(&(tv_id, season_number))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(anyhow!("TMDB returned 503 for season {}x{}", tv_id, season_number));
        }
        self.seasons
            .get(&(tv_id, season_number))
            .cloned()
            .ok_or_else(|| anyhow!("season {}x{} not in fake catalog", tv_id, season_number))
    }
}

// ============================================================================
// Trakt fake
// ============================================================================

/// Serves fixed collections, paged the way Trakt pages them, and records
/// every page request.
#[derive(Default)]
pub struct FakeTrakt {
    pub history: HashMap<&'static str, Vec<TraktHistoryItem>>,
    pub watchlist: HashMap<&'static str, Vec<TraktWatchlistItem>>,
    pub ratings: HashMap<&'static str, Vec<TraktRatingItem>>,
    pub calendar_shows: Vec<TraktCalendarShow>,
    pub calendar_movies: Vec<TraktCalendarMovie>,
    /// `(endpoint, collection, page)` per read
    pub requests: Mutex<Vec<(&'static str, &'static str, u32)>>,
    /// `(endpoint, action)` per write
    pub pushes: Mutex<Vec<(&'static str, PushAction)>>,
    /// `(endpoint, collection, page)` reads that return an error
    pub failing_pages: HashSet<(&'static str, &'static str, u32)>,
}

fn page_of<T: Clone>(items: Option<&Vec<T>>, page: u32, limit: u32) -> Vec<T> {
    let items = items.map(Vec::as_slice).unwrap_or_default();
    let start = ((page.saturating_sub(1)) * limit) as usize;
    items.iter().skip(start).take(limit as usize).cloned().collect()
}

impl FakeTrakt {
    /// Make one page read fail
    pub fn fail_page(&mut self, endpoint: &'static str, collection: &'static str, page: u32) {
        self.failing_pages.insert((endpoint, collection, page));
    }

    /// Record a page read, failing it when configured to
    fn record(&self, endpoint: &'static str, collection: TraktCollection, page: u32) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint, collection.as_str(), page));
        if self.failing_pages.contains(&(endpoint, collection.as_str(), page)) {
            return Err(anyhow!("Trakt returned 502 for {}/{} page {}", endpoint, collection.as_str(), page));
        }
        Ok(())
    }

    /// Pages requested for one endpoint/collection pair
    pub fn pages_requested(&self, endpoint: &str, collection: &str) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, c, _)| *e == endpoint && *c == collection)
            .map(|(_, _, page)| *page)
            .collect()
    }
}

#[async_trait]
impl TraktApi for FakeTrakt {
    async fn history(
        &self,
        _: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktHistoryItem>> {
        self.record("history", collection, page)?;
        Ok(page_of(self.history.get(collection.as_str()), page, limit))
    }

    async fn watchlist(
        &self,
        _: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktWatchlistItem>> {
        self.record("watchlist", collection, page)?;
        Ok(page_of(self.watchlist.get(collection.as_str()), page, limit))
    }

    async fn ratings(
        &self,
        _: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktRatingItem>> {
        self.record("ratings", collection, page)?;
        Ok(page_of(self.ratings.get(collection.as_str()), page, limit))
    }

    async fn calendar_shows(&self, _: &str, _: &str, _: u32) -> Result<Vec<TraktCalendarShow>> {
        Ok(self.calendar_shows.clone())
    }

    async fn calendar_movies(&self, _: &str, _: &str, _: u32) -> Result<Vec<TraktCalendarMovie>> {
        Ok(self.calendar_movies.clone())
    }

    async fn push_history(&self, _: &str, _: &TraktSyncPayload, action: PushAction) -> Result<()> {
        self.pushes.lock().unwrap().push(("history", action));
        Ok(())
    }

    async fn push_watchlist(&self, _: &str, _: &TraktSyncPayload, action: PushAction) -> Result<()> {
        self.pushes.lock().unwrap().push(("watchlist", action));
        Ok(())
    }
}

// ============================================================================
// Trakt item builders
// ============================================================================

pub fn tmdb_ref(tmdb_id: i64) -> TraktMedia {
    TraktMedia {
        title: None,
        year: None,
        ids: TraktIds {
            tmdb: Some(tmdb_id),
            ..Default::default()
        },
    }
}

pub fn watched_movie(tmdb_id: i64, watched_at: &str) -> TraktHistoryItem {
    TraktHistoryItem {
        watched_at: watched_at.to_string(),
        movie: Some(tmdb_ref(tmdb_id)),
        ..Default::default()
    }
}

/// History entry without episode ids; the sync matches it by season and number
pub fn watched_episode(show_tmdb_id: i64, season: i64, number: i64) -> TraktHistoryItem {
    TraktHistoryItem {
        watched_at: "2024-02-01T20:00:00.000Z".to_string(),
        show: Some(tmdb_ref(show_tmdb_id)),
        episode: Some(TraktEpisode {
            season,
            number,
            title: None,
            ids: TraktIds::default(),
        }),
        ..Default::default()
    }
}

pub fn listed_movie(tmdb_id: i64) -> TraktWatchlistItem {
    TraktWatchlistItem {
        listed_at: "2024-01-15T10:00:00.000Z".to_string(),
        movie: Some(tmdb_ref(tmdb_id)),
        show: None,
    }
}

pub fn rated_movie(tmdb_id: i64, rating: i64) -> TraktRatingItem {
    TraktRatingItem {
        rated_at: "2024-01-20T10:00:00.000Z".to_string(),
        rating,
        movie: Some(tmdb_ref(tmdb_id)),
        show: None,
    }
}
