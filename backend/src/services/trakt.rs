//! Trakt.tv API client
//!
//! Base URL: https://api.trakt.tv (API version 2)
//!
//! User-scoped calls take the user's OAuth access token. Reads used by the
//! sync orchestrator are exposed through [`TraktApi`] and are not retried;
//! the orchestrator decides what to do with a failed page.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rate_limiter::{RateLimitedClient, UpstreamError};

const TRAKT_API_URL: &str = "https://api.trakt.tv";
const TRAKT_AUTHORIZE_URL: &str = "https://trakt.tv/oauth/authorize";
const TRAKT_API_VERSION: &str = "2";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
}

/// Movie or show reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktMedia {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub ids: TraktIds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktEpisode {
    pub season: i64,
    pub number: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ids: TraktIds,
}

/// Entry of `/sync/history/{movies,episodes}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktHistoryItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub watched_at: String,
    #[serde(default)]
    pub movie: Option<TraktMedia>,
    #[serde(default)]
    pub show: Option<TraktMedia>,
    #[serde(default)]
    pub episode: Option<TraktEpisode>,
}

/// Entry of `/sync/watchlist/{movies,shows}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktWatchlistItem {
    pub listed_at: String,
    #[serde(default)]
    pub movie: Option<TraktMedia>,
    #[serde(default)]
    pub show: Option<TraktMedia>,
}

/// Entry of `/sync/ratings/{movies,shows}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktRatingItem {
    pub rated_at: String,
    pub rating: i64,
    #[serde(default)]
    pub movie: Option<TraktMedia>,
    #[serde(default)]
    pub show: Option<TraktMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktCalendarShow {
    pub first_aired: String,
    pub episode: TraktEpisode,
    pub show: TraktMedia,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktCalendarMovie {
    pub released: String,
    pub movie: TraktMedia,
}

/// Which collection a sync endpoint reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraktCollection {
    Movies,
    Shows,
    Episodes,
}

impl TraktCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraktCollection::Movies => "movies",
            TraktCollection::Shows => "shows",
            TraktCollection::Episodes => "episodes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    Add,
    Remove,
}

/// `{"ids": {"tmdb": …}, "watched_at": …}`
#[derive(Debug, Clone, Serialize)]
pub struct TraktSyncEntry {
    pub ids: TraktIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<String>,
}

impl TraktSyncEntry {
    pub fn tmdb(tmdb_id: i64, watched_at: Option<String>) -> Self {
        Self {
            ids: TraktIds {
                tmdb: Some(tmdb_id),
                ..Default::default()
            },
            watched_at,
        }
    }
}

/// Body for the `/sync/history` and `/sync/watchlist` add/remove endpoints
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraktSyncPayload {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<TraktSyncEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shows: Vec<TraktSyncEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<TraktSyncEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraktTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds from issue
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraktUserIds {
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraktUser {
    pub username: String,
    #[serde(default)]
    pub ids: Option<TraktUserIds>,
}

/// User-scoped Trakt operations
#[async_trait]
pub trait TraktApi: Send + Sync {
    async fn history(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktHistoryItem>>;

    async fn watchlist(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktWatchlistItem>>;

    async fn ratings(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktRatingItem>>;

    async fn calendar_shows(&self, access_token: &str, start_date: &str, days: u32)
    -> Result<Vec<TraktCalendarShow>>;

    async fn calendar_movies(
        &self,
        access_token: &str,
        start_date: &str,
        days: u32,
    ) -> Result<Vec<TraktCalendarMovie>>;

    async fn push_history(&self, access_token: &str, payload: &TraktSyncPayload, action: PushAction) -> Result<()>;

    async fn push_watchlist(&self, access_token: &str, payload: &TraktSyncPayload, action: PushAction)
    -> Result<()>;
}

/// Trakt OAuth application credentials plus an HTTP client
pub struct TraktClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl TraktClient {
    pub fn new(client_id: Option<String>, client_secret: Option<String>, redirect_uri: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_trakt()),
            base_url: TRAKT_API_URL.to_string(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .context("Trakt client id not configured")
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        let client_id = self.client_id()?;
        let secret = self
            .client_secret
            .as_deref()
            .context("Trakt client secret not configured")?;
        Ok((client_id, secret))
    }

    /// Authorization page URL; `state` is echoed back to the callback
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let url = url::Url::parse_with_params(
            TRAKT_AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id()?),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .context("Failed to build Trakt authorize URL")?;

        Ok(url.to_string())
    }

    async fn get<T>(&self, access_token: &str, endpoint: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let client_id = self.client_id()?;
        let bearer = format!("Bearer {}", access_token);
        let url = format!("{}{}", self.base_url, endpoint);

        self.client
            .get_json(
                &url,
                &[
                    ("Content-Type", "application/json"),
                    ("trakt-api-version", TRAKT_API_VERSION),
                    ("trakt-api-key", client_id),
                    ("Authorization", bearer.as_str()),
                ],
                query,
            )
            .await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        access_token: Option<&str>,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let client_id = self.client_id()?;
        let url = format!("{}{}", self.base_url, endpoint);
        let bearer = access_token.map(|t| format!("Bearer {}", t));

        let mut headers = vec![
            ("trakt-api-version", TRAKT_API_VERSION),
            ("trakt-api-key", client_id),
        ];
        if let Some(ref bearer) = bearer {
            headers.push(("Authorization", bearer.as_str()));
        }

        let response = self
            .client
            .send_json(Method::POST, &url, &headers, body)
            .await?;

        if let Some(err) = UpstreamError::from_status(self.client.name(), response.status()) {
            return Err(err).with_context(|| format!("Trakt POST {} failed", endpoint));
        }
        Ok(response)
    }

    fn page_query(page: u32, limit: u32) -> Vec<(&'static str, String)> {
        vec![
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("extended", "metadata".to_string()),
        ]
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<TraktTokens> {
        let (client_id, client_secret) = self.credentials()?;

        let body = serde_json::json!({
            "code": code,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": self.redirect_uri,
            "grant_type": "authorization_code",
        });

        let response = self.post(None, "/oauth/token", &body).await?;
        response
            .json::<TraktTokens>()
            .await
            .context("Failed to parse Trakt token response")
    }

    /// Profile of the token's owner
    pub async fn get_me(&self, access_token: &str) -> Result<TraktUser> {
        self.get(access_token, "/users/me", &[]).await
    }

    pub async fn revoke(&self, access_token: &str) -> Result<()> {
        let (client_id, client_secret) = self.credentials()?;

        let body = serde_json::json!({
            "token": access_token,
            "client_id": client_id,
            "client_secret": client_secret,
        });

        self.post(None, "/oauth/revoke", &body).await?;
        info!("Revoked Trakt token");
        Ok(())
    }
}

#[async_trait]
impl TraktApi for TraktClient {
    async fn history(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktHistoryItem>> {
        debug!(collection = collection.as_str(), page, "Fetching Trakt history page");
        self.get(
            access_token,
            &format!("/sync/history/{}", collection.as_str()),
            &Self::page_query(page, limit),
        )
        .await
    }

    async fn watchlist(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktWatchlistItem>> {
        debug!(collection = collection.as_str(), page, "Fetching Trakt watchlist page");
        self.get(
            access_token,
            &format!("/sync/watchlist/{}", collection.as_str()),
            &Self::page_query(page, limit),
        )
        .await
    }

    async fn ratings(
        &self,
        access_token: &str,
        collection: TraktCollection,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TraktRatingItem>> {
        debug!(collection = collection.as_str(), page, "Fetching Trakt ratings page");
        self.get(
            access_token,
            &format!("/sync/ratings/{}", collection.as_str()),
            &Self::page_query(page, limit),
        )
        .await
    }

    async fn calendar_shows(
        &self,
        access_token: &str,
        start_date: &str,
        days: u32,
    ) -> Result<Vec<TraktCalendarShow>> {
        self.get(
            access_token,
            &format!("/calendars/my/shows/{}/{}", start_date, days),
            &[],
        )
        .await
    }

    async fn calendar_movies(
        &self,
        access_token: &str,
        start_date: &str,
        days: u32,
    ) -> Result<Vec<TraktCalendarMovie>> {
        self.get(
            access_token,
            &format!("/calendars/my/movies/{}/{}", start_date, days),
            &[],
        )
        .await
    }

    async fn push_history(&self, access_token: &str, payload: &TraktSyncPayload, action: PushAction) -> Result<()> {
        let endpoint = match action {
            PushAction::Add => "/sync/history",
            PushAction::Remove => "/sync/history/remove",
        };
        self.post(Some(access_token), endpoint, payload).await?;
        Ok(())
    }

    async fn push_watchlist(&self, access_token: &str, payload: &TraktSyncPayload, action: PushAction) -> Result<()> {
        let endpoint = match action {
            PushAction::Add => "/sync/watchlist",
            PushAction::Remove => "/sync/watchlist/remove",
        };
        self.post(Some(access_token), endpoint, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TraktClient {
        TraktClient::new(
            Some("client-123".to_string()),
            Some("secret".to_string()),
            "http://localhost:3001/api/auth/trakt/callback".to_string(),
        )
    }

    #[test]
    fn test_authorize_url() {
        let url = client().authorize_url("user-1").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("trakt.tv"));
        assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(params.get("client_id").map(String::as_str), Some("client-123"));
        assert_eq!(params.get("state").map(String::as_str), Some("user-1"));
        assert_eq!(
            params.get("redirect_uri").map(String::as_str),
            Some("http://localhost:3001/api/auth/trakt/callback")
        );
    }

    #[test]
    fn test_unconfigured_client() {
        let client = TraktClient::new(None, None, String::new());
        assert!(!client.is_configured());
        assert!(client.authorize_url("x").is_err());
    }

    #[test]
    fn test_sync_payload_shape() {
        let payload = TraktSyncPayload {
            episodes: vec![TraktSyncEntry::tmdb(62085, Some("2024-01-01T00:00:00Z".to_string()))],
            ..Default::default()
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "episodes": [{"ids": {"tmdb": 62085}, "watched_at": "2024-01-01T00:00:00Z"}]
            })
        );
    }

    #[test]
    fn test_parse_episode_history() {
        let json = r#"[{
            "id": 1982346,
            "watched_at": "2014-03-31T09:28:53.000Z",
            "action": "scrobble",
            "type": "episode",
            "episode": {"season": 2, "number": 1, "title": "Pawnee Zoo", "ids": {"trakt": 251, "tmdb": 397629}},
            "show": {"title": "Parks and Recreation", "year": 2009, "ids": {"trakt": 4, "slug": "parks-and-recreation", "tmdb": 8592}}
        }]"#;

        let items: Vec<TraktHistoryItem> = serde_json::from_str(json).unwrap();
        let item = &items[0];
        assert_eq!(item.show.as_ref().and_then(|s| s.ids.tmdb), Some(8592));
        assert_eq!(item.episode.as_ref().map(|e| (e.season, e.number)), Some((2, 1)));
        assert!(item.movie.is_none());
    }
}
