//! iTunes Search API client for podcast lookup
//!
//! Base URL: https://itunes.apple.com (no key required)

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

pub struct ItunesClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesPodcast {
    #[serde(default)]
    pub collection_id: Option<i64>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub artwork_url600: Option<String>,
    #[serde(default)]
    pub artwork_url100: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub primary_genre_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesSearchResult {
    #[serde(default)]
    pub result_count: i64,
    #[serde(default)]
    pub results: Vec<ItunesPodcast>,
}

impl ItunesClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_itunes()),
            base_url: "https://itunes.apple.com".to_string(),
            retry_config: RetryConfig::default(),
        }
    }

    async fn fetch(&self, endpoint: &str, params: Vec<(&str, String)>, op: &str) -> Result<ItunesSearchResult> {
        let url = format!("{}{}", self.base_url, endpoint);

        retry_async(
            || {
                let client = self.client.clone();
                let url = url.clone();
                let params = params.clone();
                async move { client.get_json(&url, &[], &params).await }
            },
            &self.retry_config,
            op,
        )
        .await
    }

    pub async fn search_podcasts(&self, term: &str, limit: i64) -> Result<ItunesSearchResult> {
        self.fetch(
            "/search",
            vec![
                ("term", term.to_string()),
                ("media", "podcast".to_string()),
                ("limit", limit.to_string()),
            ],
            "itunes_search",
        )
        .await
    }

    /// Look up one podcast by collection id; the first result is the podcast
    pub async fn get_podcast(&self, itunes_id: &str) -> Result<Option<ItunesPodcast>> {
        let result = self
            .fetch(
                "/lookup",
                vec![("id", itunes_id.to_string()), ("entity", "podcast".to_string())],
                "itunes_lookup",
            )
            .await?;

        Ok(result.results.into_iter().next())
    }
}

impl Default for ItunesClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup() {
        let json = r#"{
            "resultCount": 1,
            "results": [{
                "collectionId": 1200361736,
                "artistName": "The New York Times",
                "collectionName": "The Daily",
                "feedUrl": "https://feeds.simplecast.com/54nAGcIl",
                "artworkUrl600": "https://img/600.jpg",
                "genres": ["Daily News", "Podcasts", "News"]
            }]
        }"#;

        let result: ItunesSearchResult = serde_json::from_str(json).unwrap();
        let podcast = &result.results[0];
        assert_eq!(podcast.collection_id, Some(1200361736));
        assert_eq!(podcast.collection_name.as_deref(), Some("The Daily"));
        assert_eq!(podcast.genres.as_ref().map(Vec::len), Some(3));
    }
}
