//! Federated search across movies, TV, books and podcasts
//!
//! All providers are queried concurrently. A provider that fails contributes
//! an empty list; the request itself only fails on bad input.

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ApiResult;
use crate::AppState;
use crate::services::google_books::{GoogleBookVolumeInfo, GoogleBooksSearchResult};
use crate::services::tmdb::{TmdbClient, TmdbMediaDetails, TmdbPage};

pub const DEFAULT_OMNI_LIMIT: usize = 5;
pub const MAX_OMNI_LIMIT: usize = 20;

/// Shortest (trimmed) query that reaches the providers
const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Deserialize)]
pub struct OmniQuery {
    pub q: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OmniId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct OmniResult {
    pub id: OmniId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub image: Option<String>,
    pub media_type: &'static str,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct OmniTotals {
    pub movies: usize,
    pub tv: usize,
    pub books: usize,
    pub podcasts: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct OmniResponse {
    pub query: String,
    pub movies: Vec<OmniResult>,
    pub tv: Vec<OmniResult>,
    pub books: Vec<OmniResult>,
    pub podcasts: Vec<OmniResult>,
    pub totals: OmniTotals,
}

/// `limit` query parameter: unparsable or zero means the default
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_OMNI_LIMIT)
        .min(MAX_OMNI_LIMIT)
}

fn https(url: String) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url,
    }
}

fn year_of(date: Option<&str>) -> Option<String> {
    date.and_then(|d| d.get(..4)).filter(|y| !y.is_empty()).map(str::to_string)
}

fn screen_result(item: &TmdbMediaDetails, media_type: &'static str) -> OmniResult {
    let date = if media_type == "movie" {
        item.release_date.as_deref()
    } else {
        item.first_air_date.as_deref()
    };
    let year = year_of(date);

    OmniResult {
        id: OmniId::Number(item.id),
        title: item.display_title(),
        subtitle: year.clone(),
        image: item.poster_path.as_deref().map(|p| TmdbClient::image_url(p, "w500")),
        media_type,
        url: format!("/media/{}/{}", media_type, item.id),
        year,
        rating: item.vote_average.filter(|r| *r > 0.0),
    }
}

fn book_thumbnail(info: &GoogleBookVolumeInfo) -> Option<String> {
    let links = info.image_links.as_ref()?;
    links
        .thumbnail
        .clone()
        .or_else(|| links.small_thumbnail.clone())
        .map(https)
}

fn tab_url(query: &str, tab: &str) -> String {
    format!("/search?q={}&tab={}", urlencoding::encode(query), tab)
}

/// Merge provider results; failed providers are logged and contribute nothing
pub fn assemble(
    query: &str,
    limit: usize,
    screen: Result<TmdbPage>,
    books: Result<GoogleBooksSearchResult>,
    podcasts: Result<Vec<OmniResult>>,
) -> OmniResponse {
    let mut response = OmniResponse {
        query: query.to_string(),
        ..Default::default()
    };

    match screen {
        Ok(page) => {
            for media_type in ["movie", "tv"] {
                let results = page
                    .results
                    .iter()
                    .filter(|item| item.media_type.as_deref() == Some(media_type))
                    .take(limit)
                    .map(|item| screen_result(item, media_type))
                    .collect();
                if media_type == "movie" {
                    response.movies = results;
                } else {
                    response.tv = results;
                }
            }
        }
        Err(e) => warn!(query, error = %e, "Omni search: TMDB failed"),
    }

    match books {
        Ok(result) => {
            response.books = result
                .items
                .iter()
                .take(limit)
                .map(|item| {
                    let info = &item.volume_info;
                    OmniResult {
                        id: OmniId::Text(item.id.clone()),
                        title: info.title.clone().unwrap_or_else(|| "Untitled".to_string()),
                        subtitle: info
                            .authors
                            .as_ref()
                            .filter(|a| !a.is_empty())
                            .map(|a| a.iter().take(2).cloned().collect::<Vec<_>>().join(", ")),
                        image: book_thumbnail(info),
                        media_type: "book",
                        url: tab_url(query, "books"),
                        year: year_of(info.published_date.as_deref()),
                        rating: info.average_rating.filter(|r| *r > 0.0),
                    }
                })
                .collect();
        }
        Err(e) => warn!(query, error = %e, "Omni search: Google Books failed"),
    }

    match podcasts {
        Ok(mut results) => {
            results.truncate(limit);
            response.podcasts = results;
        }
        Err(e) => warn!(query, error = %e, "Omni search: podcast search failed"),
    }

    response.totals = OmniTotals {
        movies: response.movies.len(),
        tv: response.tv.len(),
        books: response.books.len(),
        podcasts: response.podcasts.len(),
    };
    response
}

/// ListenNotes when configured, falling back to iTunes
async fn search_podcasts(state: &AppState, query: &str, limit: usize) -> Result<Vec<OmniResult>> {
    let url = tab_url(query, "podcasts");

    if let Some(ref listen_notes) = state.listen_notes {
        match listen_notes.search_podcasts(query, 0).await {
            Ok(found) => {
                return Ok(found
                    .results
                    .into_iter()
                    .take(limit)
                    .map(|p| OmniResult {
                        title: p.display_title().unwrap_or_default(),
                        subtitle: p.display_publisher(),
                        image: p.image.clone().or_else(|| p.thumbnail.clone()).map(https),
                        id: OmniId::Text(p.id),
                        media_type: "podcast",
                        url: url.clone(),
                        year: None,
                        rating: None,
                    })
                    .collect());
            }
            Err(e) => warn!(query, error = %e, "ListenNotes search failed, falling back to iTunes"),
        }
    }

    let found = state.itunes.search_podcasts(query, limit as i64).await?;
    Ok(found
        .results
        .into_iter()
        .filter_map(|p| {
            Some(OmniResult {
                id: OmniId::Number(p.collection_id?),
                title: p.collection_name.clone().unwrap_or_default(),
                subtitle: p.artist_name.clone(),
                image: p.artwork_url600.clone().or_else(|| p.artwork_url100.clone()).map(https),
                media_type: "podcast",
                url: url.clone(),
                year: None,
                rating: None,
            })
        })
        .take(limit)
        .collect())
}

async fn omni(State(state): State<AppState>, Query(query): Query<OmniQuery>) -> ApiResult<Json<OmniResponse>> {
    let q = query.q.unwrap_or_default();
    if q.trim().chars().count() < MIN_QUERY_LEN {
        return Ok(Json(OmniResponse {
            query: q,
            ..Default::default()
        }));
    }
    let limit = parse_limit(query.limit.as_deref());

    let (screen, books, podcasts) = tokio::join!(
        state.tmdb.search_multi(&q, 1),
        state.google_books.search(&q, 0, limit as i64),
        search_podcasts(&state, &q, limit),
    );

    Ok(Json(assemble(&q, limit, screen, books, podcasts)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/search/omni", get(omni))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::google_books::{GoogleBookImageLinks, GoogleBookItem};
    use pretty_assertions::assert_eq;

    fn screen_page() -> TmdbPage {
        let item = |id: i64, media_type: &str, title: &str| TmdbMediaDetails {
            id,
            media_type: Some(media_type.to_string()),
            title: (media_type == "movie").then(|| title.to_string()),
            name: (media_type != "movie").then(|| title.to_string()),
            release_date: Some("2024-01-01".to_string()),
            first_air_date: Some("2023-05-10".to_string()),
            poster_path: Some("/p.jpg".to_string()),
            vote_average: Some(7.5),
            ..Default::default()
        };
        TmdbPage {
            page: 1,
            results: vec![
                item(1, "movie", "Movie A"),
                item(2, "tv", "Show B"),
                item(3, "person", "Someone"),
                item(4, "movie", "Movie C"),
            ],
            total_pages: 1,
            total_results: 4,
        }
    }

    fn books() -> GoogleBooksSearchResult {
        GoogleBooksSearchResult {
            kind: "books#volumes".to_string(),
            total_items: 1,
            items: vec![GoogleBookItem {
                id: "vol-1".to_string(),
                volume_info: GoogleBookVolumeInfo {
                    title: None,
                    authors: Some(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
                    published_date: Some("1999-09-09".to_string()),
                    image_links: Some(GoogleBookImageLinks {
                        small_thumbnail: None,
                        thumbnail: Some("http://books.example/t.jpg".to_string()),
                    }),
                    ..Default::default()
                },
                sale_info: None,
            }],
        }
    }

    #[test]
    fn test_limit_parsing() {
        assert_eq!(parse_limit(None), DEFAULT_OMNI_LIMIT);
        assert_eq!(parse_limit(Some("abc")), DEFAULT_OMNI_LIMIT);
        assert_eq!(parse_limit(Some("0")), DEFAULT_OMNI_LIMIT);
        assert_eq!(parse_limit(Some("8")), 8);
        assert_eq!(parse_limit(Some("500")), MAX_OMNI_LIMIT);
    }

    #[test]
    fn test_results_split_by_category() {
        let response = assemble("abc", 5, Ok(screen_page()), Ok(books()), Ok(Vec::new()));

        let movie_ids: Vec<OmniId> = response.movies.iter().map(|r| r.id.clone()).collect();
        assert_eq!(movie_ids, vec![OmniId::Number(1), OmniId::Number(4)]);
        assert_eq!(response.tv.len(), 1);
        assert_eq!(response.tv[0].url, "/media/tv/2");
        assert_eq!(response.tv[0].year.as_deref(), Some("2023"));

        let book = &response.books[0];
        assert_eq!(book.title, "Untitled");
        assert_eq!(book.subtitle.as_deref(), Some("A, B"));
        assert_eq!(book.image.as_deref(), Some("https://books.example/t.jpg"));
        assert_eq!(book.url, "/search?q=abc&tab=books");

        assert_eq!(response.totals.movies, 2);
        assert_eq!(response.totals.books, 1);
    }

    #[test]
    fn test_failed_provider_leaves_others_intact() {
        let response = assemble(
            "abc",
            1,
            Err(anyhow::anyhow!("TMDB down")),
            Ok(books()),
            Err(anyhow::anyhow!("iTunes down")),
        );

        assert!(response.movies.is_empty());
        assert!(response.tv.is_empty());
        assert!(response.podcasts.is_empty());
        assert_eq!(response.books.len(), 1);
        assert_eq!(response.totals.books, 1);
    }

    #[test]
    fn test_limit_applies_per_category() {
        let response = assemble("abc", 1, Ok(screen_page()), Ok(books()), Ok(Vec::new()));
        assert_eq!(response.movies.len(), 1);
        assert_eq!(response.tv.len(), 1);
    }
}
