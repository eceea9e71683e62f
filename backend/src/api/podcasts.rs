//! Podcast endpoints: listen status, search and detail

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use super::library::StatusResponse;
use crate::AppState;
use crate::db::{ListenStatus, PodcastRecord};
use crate::services::catalog::{refresh_podcast_episodes, upsert_podcast, upsert_podcast_from_listen_notes};
use crate::services::library;

const DEFAULT_SEARCH_LIMIT: i64 = 20;

/// Episodes returned with a podcast's detail
const DETAIL_EPISODE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastStatusQuery {
    pub itunes_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPodcastStatusRequest {
    pub itunes_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub progress: i64,
}

#[derive(Debug, Deserialize)]
pub struct PodcastSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    /// `itunes` (default) or `listennotes`
    pub source: Option<String>,
    #[serde(default)]
    pub offset: i64,
}

async fn get_podcast_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PodcastStatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let itunes_id = query
        .itunes_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing itunesId"))?;

    let Some(podcast) = state.db.podcasts().get_by_itunes_id(&itunes_id).await? else {
        return Ok(Json(StatusResponse::untracked()));
    };

    let progress = state.db.podcasts().get_progress(user.id, podcast.id).await?;
    Ok(Json(StatusResponse {
        status: progress.as_ref().map(|p| p.status.clone()),
        progress: Some(progress.as_ref().map(|p| p.progress).unwrap_or(0)),
        updated_at: progress.map(|p| p.updated_at),
    }))
}

async fn set_podcast_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<SetPodcastStatusRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(itunes_id), Some(raw_status)) = (body.itunes_id.as_deref(), body.status.as_deref()) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    let status = ListenStatus::parse(raw_status).ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    let record = library::set_podcast_status(
        &state.db,
        &state.itunes,
        user.id,
        itunes_id,
        status,
        body.progress,
    )
    .await?;

    Ok(Json(json!({ "success": true, "status": record.status })))
}

/// Search iTunes (or ListenNotes when asked and configured) and mirror the
/// results into the local catalog
async fn search(
    State(state): State<AppState>,
    Query(query): Query<PodcastSearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;

    if query.source.as_deref() == Some("listennotes")
        && let Some(ref listen_notes) = state.listen_notes
    {
        let results = listen_notes.search_podcasts(&q, query.offset.max(0)).await?;
        for item in &results.results {
            if let Err(e) = upsert_podcast_from_listen_notes(&state.db, item).await {
                warn!(listen_notes_id = %item.id, error = %e, "Failed to upsert podcast");
            }
        }
        return Ok(Json(serde_json::to_value(results).map_err(anyhow::Error::from)?));
    }

    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, 200);
    let results = state.itunes.search_podcasts(&q, limit).await?;
    for item in &results.results {
        if let Err(e) = upsert_podcast(&state.db, item).await {
            warn!(collection_id = ?item.collection_id, error = %e, "Failed to upsert podcast");
        }
    }

    Ok(Json(serde_json::to_value(results).map_err(anyhow::Error::from)?))
}

/// Resolve a podcast by local id, iTunes id or ListenNotes id, fetching it
/// from the providers when it is not stored yet
async fn resolve_podcast(state: &AppState, id: &str) -> ApiResult<Option<PodcastRecord>> {
    if let Some(podcast) = state.db.podcasts().find_by_any_id(id).await? {
        return Ok(Some(podcast));
    }

    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        match state.itunes.get_podcast(id).await {
            Ok(Some(item)) => {
                let podcast_id = upsert_podcast(&state.db, &item).await?;
                return Ok(state.db.podcasts().get_by_id(podcast_id).await?);
            }
            Ok(None) => {}
            Err(e) => warn!(id, error = %e, "Failed to fetch podcast from iTunes"),
        }
    }

    if let Some(ref listen_notes) = state.listen_notes {
        match listen_notes.get_podcast(id).await {
            Ok(item) => {
                let podcast_id = upsert_podcast_from_listen_notes(&state.db, &item).await?;
                return Ok(state.db.podcasts().get_by_id(podcast_id).await?);
            }
            Err(e) => warn!(id, error = %e, "Failed to fetch podcast from ListenNotes"),
        }
    }

    Ok(None)
}

async fn detail(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let podcast = resolve_podcast(&state, id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("Podcast not found"))?;

    if let Err(e) = refresh_podcast_episodes(&state.db, &state.feed, podcast.id).await {
        warn!(podcast_id = podcast.id, error = %e, "Failed to refresh podcast feed");
    }

    // Re-read so a refreshed description is returned
    let podcast = state.db.podcasts().get_by_id(podcast.id).await?.unwrap_or(podcast);
    let episodes = state
        .db
        .podcasts()
        .list_episodes(podcast.id, DETAIL_EPISODE_LIMIT)
        .await?;

    let mut body = serde_json::to_value(&podcast).map_err(anyhow::Error::from)?;
    if let Value::Object(ref mut map) = body {
        map.insert("title".to_string(), json!(podcast.collection_name));
        map.insert("publisher".to_string(), json!(podcast.artist_name));
        map.insert("image".to_string(), json!(podcast.artwork_url));
        map.insert("episodes".to_string(), json!(episodes));
    }

    Ok(Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/podcasts/status", get(get_podcast_status).post(set_podcast_status))
        .route("/podcasts/search", get(search))
        .route("/podcasts/{id}", get(detail))
}
