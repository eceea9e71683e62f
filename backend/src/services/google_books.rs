//! Google Books API client
//!
//! Base URL: https://www.googleapis.com/books/v1
//!
//! The API key is optional; unauthenticated calls share a lower quota.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

pub struct GoogleBooksClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: Option<String>,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBookImageLinks {
    #[serde(default)]
    pub small_thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBookVolumeInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_links: Option<GoogleBookImageLinks>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub ratings_count: Option<i64>,
    #[serde(default)]
    pub print_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBookSaleInfo {
    #[serde(default)]
    pub is_ebook: Option<bool>,
}

/// One volume from search results or the volume endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBookItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub volume_info: GoogleBookVolumeInfo,
    #[serde(default)]
    pub sale_info: Option<GoogleBookSaleInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBooksSearchResult {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub total_items: i64,
    #[serde(default)]
    pub items: Vec<GoogleBookItem>,
}

impl GoogleBooksClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_google_books()),
            base_url: "https://www.googleapis.com/books/v1".to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        }
    }

    async fn fetch<T>(&self, endpoint: &str, mut params: Vec<(&str, String)>, op: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if let Some(ref key) = self.api_key {
            params.push(("key", key.clone()));
        }
        let url = format!("{}{}", self.base_url, endpoint);

        retry_async(
            || {
                let client = self.client.clone();
                let url = url.clone();
                let params = params.clone();
                async move { client.get_json::<T, _>(&url, &[], &params).await }
            },
            &self.retry_config,
            op,
        )
        .await
    }

    /// Full-text volume search
    pub async fn search(
        &self,
        query: &str,
        start_index: i64,
        max_results: i64,
    ) -> Result<GoogleBooksSearchResult> {
        debug!(query = %query, start_index, "Searching Google Books");
        self.fetch(
            "/volumes",
            vec![
                ("q", query.to_string()),
                ("startIndex", start_index.to_string()),
                ("maxResults", max_results.to_string()),
            ],
            "google_books_search",
        )
        .await
    }

    pub async fn get_book(&self, google_id: &str) -> Result<GoogleBookItem> {
        self.fetch(
            &format!("/volumes/{}", urlencoding::encode(google_id)),
            Vec::new(),
            "google_books_get",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_result() {
        let json = r#"{
            "kind": "books#volumes",
            "totalItems": 1,
            "items": [{
                "id": "zyTCAlFPjgYC",
                "volumeInfo": {
                    "title": "The Google Story",
                    "authors": ["David A. Vise", "Mark Malseed"],
                    "imageLinks": {"smallThumbnail": "http://x/s.jpg"},
                    "pageCount": 207,
                    "averageRating": 3.5
                },
                "saleInfo": {"isEbook": true}
            }]
        }"#;

        let result: GoogleBooksSearchResult = serde_json::from_str(json).unwrap();
        let book = &result.items[0];
        assert_eq!(book.id, "zyTCAlFPjgYC");
        assert_eq!(book.volume_info.authors.as_ref().map(Vec::len), Some(2));
        assert_eq!(book.sale_info.as_ref().and_then(|s| s.is_ebook), Some(true));
    }

    #[test]
    fn test_parse_empty_search() {
        let result: GoogleBooksSearchResult =
            serde_json::from_str(r#"{"kind": "books#volumes", "totalItems": 0}"#).unwrap();
        assert!(result.items.is_empty());
    }
}
