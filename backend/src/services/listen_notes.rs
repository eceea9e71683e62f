//! ListenNotes podcast API client
//!
//! Base URL: https://listen-api.listennotes.com/api/v2
//! Authenticated with the `X-ListenAPI-Key` header.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

pub struct ListenNotesClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenNotesEpisode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub audio_length_sec: Option<i64>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub pub_date_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenNotesPodcast {
    pub id: String,
    #[serde(default)]
    pub title_original: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publisher_original: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub description_original: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub total_episodes: Option<i64>,
    #[serde(default)]
    pub itunes_id: Option<i64>,
    #[serde(default)]
    pub rss: Option<String>,
    #[serde(default)]
    pub listen_score: Option<i64>,
    #[serde(default)]
    pub genre_ids: Option<Vec<i64>>,
    /// Present on the podcast detail endpoint
    #[serde(default)]
    pub episodes: Option<Vec<ListenNotesEpisode>>,
}

impl ListenNotesPodcast {
    /// Search results use the `_original` fields, detail responses the plain ones
    pub fn display_title(&self) -> Option<String> {
        self.title_original.clone().or_else(|| self.title.clone())
    }

    pub fn display_publisher(&self) -> Option<String> {
        self.publisher_original.clone().or_else(|| self.publisher.clone())
    }

    pub fn display_description(&self) -> Option<String> {
        self.description_original.clone().or_else(|| self.description.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenNotesSearchResponse {
    #[serde(default)]
    pub next_offset: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub results: Vec<ListenNotesPodcast>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenNotesBestPodcasts {
    #[serde(default)]
    pub podcasts: Vec<ListenNotesPodcast>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub page_number: i64,
}

impl ListenNotesClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_listen_notes()),
            base_url: "https://listen-api.listennotes.com/api/v2".to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    async fn fetch<T>(&self, endpoint: &str, params: Vec<(&str, String)>, op: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);

        retry_async(
            || {
                let client = self.client.clone();
                let url = url.clone();
                let params = params.clone();
                let api_key = self.api_key.clone();
                async move {
                    client
                        .get_json::<T, _>(&url, &[("X-ListenAPI-Key", api_key.as_str())], &params)
                        .await
                }
            },
            &self.retry_config,
            op,
        )
        .await
    }

    pub async fn search_podcasts(&self, query: &str, offset: i64) -> Result<ListenNotesSearchResponse> {
        self.fetch(
            "/search",
            vec![
                ("q", query.to_string()),
                ("type", "podcast".to_string()),
                ("offset", offset.to_string()),
            ],
            "listen_notes_search",
        )
        .await
    }

    pub async fn get_podcast(&self, id: &str) -> Result<ListenNotesPodcast> {
        self.fetch(
            &format!("/podcasts/{}", urlencoding::encode(id)),
            Vec::new(),
            "listen_notes_get_podcast",
        )
        .await
    }

    pub async fn best_podcasts(&self, genre_id: Option<i64>, page: Option<i64>) -> Result<ListenNotesBestPodcasts> {
        let mut params = Vec::new();
        if let Some(genre_id) = genre_id {
            params.push(("genre_id", genre_id.to_string()));
        }
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        self.fetch("/best_podcasts", params, "listen_notes_best").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_result_fields() {
        let json = r#"{
            "next_offset": 10,
            "total": 1,
            "count": 1,
            "results": [{
                "id": "4d3fe717742d4963a85562e9f84d8c79",
                "title_original": "Star Wars 7x7",
                "publisher_original": "Allen Voivod",
                "image": "https://cdn/img.jpg",
                "thumbnail": "https://cdn/thumb.jpg",
                "total_episodes": 1700,
                "itunes_id": 896354638,
                "genre_ids": [86, 68]
            }]
        }"#;

        let response: ListenNotesSearchResponse = serde_json::from_str(json).unwrap();
        let podcast = &response.results[0];
        assert_eq!(podcast.display_title().as_deref(), Some("Star Wars 7x7"));
        assert_eq!(podcast.itunes_id, Some(896354638));
        assert!(podcast.episodes.is_none());
    }

    #[test]
    fn test_detail_uses_plain_fields() {
        let json = r#"{
            "id": "abc",
            "title": "Detail Title",
            "publisher": "Someone",
            "episodes": [{"id": "e1", "title": "Ep 1", "audio_length_sec": 1800, "pub_date_ms": 1700000000000}]
        }"#;

        let podcast: ListenNotesPodcast = serde_json::from_str(json).unwrap();
        assert_eq!(podcast.display_title().as_deref(), Some("Detail Title"));
        assert_eq!(podcast.display_publisher().as_deref(), Some("Someone"));
        assert_eq!(podcast.episodes.unwrap()[0].audio_length_sec, Some(1800));
    }
}
