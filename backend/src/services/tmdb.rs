//! TMDB (The Movie Database) API client for movie and TV metadata
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds.
//! This client uses rate limiting and retry logic to handle this gracefully.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::ShowCatalog;
use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

/// Movie or TV show as returned by the detail, search and trending endpoints.
///
/// Movies carry `title`/`release_date`, shows carry `name`/`first_air_date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbMediaDetails {
    pub id: i64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub last_air_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<i64>,
    /// Only present on TV details
    #[serde(default)]
    pub seasons: Option<Vec<TmdbSeason>>,
}

impl TmdbMediaDetails {
    /// Display title with the movie/TV fallback chain
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.name.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn original_display_title(&self) -> Option<String> {
        self.original_title.clone().or_else(|| self.original_name.clone())
    }

    /// Release date for movies, first air date for shows
    pub fn effective_release_date(&self) -> Option<String> {
        self.release_date
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| self.first_air_date.clone().filter(|d| !d.is_empty()))
    }
}

/// A season, either as a summary inside TV details or from the season endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbSeason {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    pub season_number: i64,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub episode_count: Option<i64>,
    /// Only present on the season endpoint
    #[serde(default)]
    pub episodes: Option<Vec<TmdbEpisode>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbEpisode {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub air_date: Option<String>,
    pub episode_number: i64,
    #[serde(default)]
    pub still_path: Option<String>,
    #[serde(default)]
    pub season_number: Option<i64>,
    #[serde(default)]
    pub show_id: Option<i64>,
}

/// Paged search/trending response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbPage {
    pub page: i64,
    pub results: Vec<TmdbMediaDetails>,
    pub total_pages: i64,
    pub total_results: i64,
}

impl TmdbClient {
    /// Create a new TMDB client with the given API key
    pub fn new(api_key: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tmdb()),
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Get the image base URL for poster/backdrop images
    pub fn image_url(path: &str, size: &str) -> String {
        format!("https://image.tmdb.org/t/p/{}{}", size, path)
    }

    /// GET `endpoint` with the API key and extra query parameters, with retries
    async fn fetch<T>(&self, endpoint: &str, params: &[(&str, String)], op: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let url = format!("{}{}", self.base_url, endpoint);
        let mut query: Vec<(&str, String)> = vec![("api_key", self.api_key.clone())];
        query.extend(params.iter().cloned());

        retry_async(
            || {
                let client = self.client.clone();
                let url = url.clone();
                let query = query.clone();
                async move { client.get_json::<T, _>(&url, &[], &query).await }
            },
            &self.retry_config,
            op,
        )
        .await
    }

    /// Get movie details by TMDB ID
    pub async fn get_movie(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        debug!(tmdb_id, "Fetching movie details from TMDB");
        let mut movie: TmdbMediaDetails = self
            .fetch(&format!("/movie/{}", tmdb_id), &[], "tmdb_get_movie")
            .await?;
        // Detail endpoints omit media_type
        movie.media_type = Some("movie".to_string());
        Ok(movie)
    }

    /// Get TV show details, including the season list
    pub async fn get_tv(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        debug!(tmdb_id, "Fetching TV details from TMDB");
        let mut show: TmdbMediaDetails = self
            .fetch(&format!("/tv/{}", tmdb_id), &[], "tmdb_get_tv")
            .await?;
        show.media_type = Some("tv".to_string());
        Ok(show)
    }

    /// Get one season of a show, including its episodes
    pub async fn get_season(&self, tv_id: i64, season_number: i64) -> Result<TmdbSeason> {
        debug!(tv_id, season_number, "Fetching season from TMDB");
        self.fetch(
            &format!("/tv/{}/season/{}", tv_id, season_number),
            &[],
            "tmdb_get_season",
        )
        .await
    }

    pub async fn get_episode(
        &self,
        tv_id: i64,
        season_number: i64,
        episode_number: i64,
    ) -> Result<TmdbEpisode> {
        self.fetch(
            &format!(
                "/tv/{}/season/{}/episode/{}",
                tv_id, season_number, episode_number
            ),
            &[],
            "tmdb_get_episode",
        )
        .await
    }

    /// Search movies, shows and people in one call
    pub async fn search_multi(&self, query: &str, page: i64) -> Result<TmdbPage> {
        self.fetch(
            "/search/multi",
            &[
                ("query", query.to_string()),
                ("page", page.to_string()),
                ("include_adult", "false".to_string()),
            ],
            "tmdb_search_multi",
        )
        .await
    }

    /// Trending titles; `media_type` is `movie`, `tv` or `all`,
    /// `time_window` is `day` or `week`
    pub async fn trending(&self, media_type: &str, time_window: &str) -> Result<TmdbPage> {
        self.fetch(
            &format!("/trending/{}/{}", media_type, time_window),
            &[],
            "tmdb_trending",
        )
        .await
    }
}

#[async_trait]
impl ShowCatalog for TmdbClient {
    async fn movie(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        self.get_movie(tmdb_id).await
    }

    async fn tv(&self, tmdb_id: i64) -> Result<TmdbMediaDetails> {
        self.get_tv(tmdb_id).await
    }

    async fn season(&self, tv_id: i64, season_number: i64) -> Result<TmdbSeason> {
        self.get_season(tv_id, season_number).await
    }
}
