//! Library REST endpoints: watch status, listings, episode flags

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::db::{LibraryItemRecord, MediaType, WatchStatus};
use crate::services::TraktPush;
use crate::services::library::{self, CONTINUE_WATCHING_LIMIT};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub tmdb_id: Option<i64>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusRequest {
    pub tmdb_id: Option<i64>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StatusResponse {
    /// The item is not in the local catalog yet
    pub fn untracked() -> Self {
        Self {
            status: None,
            progress: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeStatusQuery {
    pub episode_ids: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEpisodeStatusRequest {
    pub episode_id: Option<i64>,
    pub watched: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllRequest {
    pub tv_id: Option<i64>,
    #[serde(default = "default_true")]
    pub mark_watched: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextEpisodeQuery {
    pub tmdb_id: Option<String>,
}

/// Movie or TV; other media types have their own endpoints
fn screen_type(raw: Option<&str>) -> ApiResult<MediaType> {
    raw.and_then(MediaType::parse)
        .filter(MediaType::is_screen)
        .ok_or_else(|| ApiError::bad_request("Invalid type parameter"))
}

async fn get_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let (Some(tmdb_id), Some(raw_type)) = (query.tmdb_id, query.media_type.as_deref()) else {
        return Err(ApiError::bad_request("Missing tmdbId or type"));
    };
    let media_type = screen_type(Some(raw_type))?;

    let Some(item) = state.db.media_items().find_by_tmdb(tmdb_id, media_type).await? else {
        return Ok(Json(StatusResponse::untracked()));
    };

    let progress = state.db.progress().get(user.id, item.id).await?;
    Ok(Json(StatusResponse {
        status: progress.as_ref().map(|p| p.status.clone()),
        progress: Some(progress.as_ref().map(|p| p.progress).unwrap_or(0)),
        updated_at: progress.map(|p| p.updated_at),
    }))
}

async fn set_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<SetStatusRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(tmdb_id), Some(raw_type), Some(raw_status)) =
        (body.tmdb_id, body.media_type.as_deref(), body.status.as_deref())
    else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    let media_type = screen_type(Some(raw_type))?;
    let status = WatchStatus::parse(raw_status).ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    let record = library::set_media_status(
        &state.db,
        state.catalog.as_ref(),
        user.id,
        tmdb_id,
        media_type,
        status,
        body.progress,
    )
    .await?;

    if let Some(push) = TraktPush::for_media_status(tmdb_id, media_type, status) {
        state.pusher().spawn(user.id, push);
    }

    Ok(Json(json!({ "success": true, "status": record.status })))
}

async fn list_items(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<Value>> {
    let (Some(raw_type), Some(status)) = (query.media_type.as_deref(), query.status.as_deref()) else {
        return Err(ApiError::bad_request("Missing type or status parameter"));
    };
    let media_type = MediaType::parse(raw_type).ok_or_else(|| ApiError::bad_request("Invalid type parameter"))?;

    let items: Vec<Value> = match media_type {
        MediaType::Movie | MediaType::Tv => state
            .db
            .progress()
            .list_library(user.id, media_type, status)
            .await?
            .iter()
            .map(screen_item_json)
            .collect(),
        MediaType::Book | MediaType::Ebook => state
            .db
            .books()
            .list_library(user.id, media_type == MediaType::Ebook, status)
            .await?
            .into_iter()
            .map(|entry| {
                let book = entry.book;
                json!({
                    "id": book.google_id,
                    "volumeInfo": {
                        "title": book.title,
                        "authors": book.authors,
                        "imageLinks": { "thumbnail": book.thumbnail },
                        "publishedDate": book.published_date,
                        "averageRating": book.average_rating.map(|r| r as f64 / 10.0),
                    },
                    "status": entry.status,
                    "progress": entry.progress,
                })
            })
            .collect(),
        MediaType::Podcast => state
            .db
            .podcasts()
            .list_library(user.id, status)
            .await?
            .into_iter()
            .map(|entry| {
                let podcast = entry.podcast;
                let itunes_id = podcast.itunes_id.as_deref().and_then(|id| id.parse::<i64>().ok());
                json!({
                    "id": podcast
                        .listen_notes_id
                        .clone()
                        .or_else(|| podcast.itunes_id.clone())
                        .unwrap_or_else(|| podcast.id.to_string()),
                    "listenNotesId": podcast.listen_notes_id,
                    "itunesId": itunes_id,
                    "collectionId": itunes_id.unwrap_or(podcast.id),
                    "collectionName": podcast.collection_name,
                    "artistName": podcast.artist_name,
                    "artworkUrl600": podcast.artwork_url,
                    "status": entry.status,
                    "progress": entry.progress,
                })
            })
            .collect(),
    };

    Ok(Json(json!({
        "total": items.len(),
        "items": items,
        "type": media_type,
        "status": status,
    })))
}

/// TMDB-shaped listing entry so clients can reuse their search cards
fn screen_item_json(item: &LibraryItemRecord) -> Value {
    json!({
        "id": item.tmdb_id,
        "mediaItemId": item.media_item_id,
        "media_type": item.media_type,
        "title": item.title,
        "name": item.title,
        "overview": item.overview,
        "poster_path": item.poster_path,
        "backdrop_path": item.backdrop_path,
        "vote_average": item.vote_average.unwrap_or(0) as f64 / 10.0,
        "release_date": item.release_date,
        "first_air_date": item.release_date,
        "last_air_date": item.last_air_date,
        "status": item.status,
        "progress": item.progress,
        "updatedAt": item.updated_at,
    })
}

async fn watching(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Value>> {
    let items = state
        .db
        .progress()
        .list_watching(user.id, CONTINUE_WATCHING_LIMIT)
        .await?;

    Ok(Json(json!({ "success": true, "data": items })))
}

async fn get_episode_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<EpisodeStatusQuery>,
) -> ApiResult<Json<HashMap<i64, bool>>> {
    let ids: Vec<i64> = query
        .episode_ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect();

    if ids.is_empty() {
        return Err(ApiError::bad_request("No episode IDs provided"));
    }

    let statuses = state.db.episode_progress().statuses(user.id, &ids).await?;
    Ok(Json(statuses))
}

async fn set_episode_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<SetEpisodeStatusRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(episode_id), Some(watched)) = (body.episode_id, body.watched) else {
        return Err(ApiError::bad_request(
            "Invalid request. Requires episodeId and watched (boolean)",
        ));
    };

    let episode_tmdb_id = library::set_episode_status(&state.db, user.id, episode_id, watched).await?;
    state
        .pusher()
        .spawn(user.id, TraktPush::for_episode(episode_tmdb_id, watched));

    Ok(Json(json!({ "success": true, "watched": watched })))
}

async fn mark_all_episodes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<MarkAllRequest>,
) -> ApiResult<Json<Value>> {
    let tv_id = body.tv_id.ok_or_else(|| ApiError::bad_request("Missing tvId"))?;

    let count = library::bulk_update_episode_status(
        &state.db,
        user.id,
        tv_id,
        body.mark_watched,
        Some(state.catalog.as_ref()),
    )
    .await?;

    Ok(Json(json!({ "success": true, "count": count, "watched": body.mark_watched })))
}

async fn next_episode(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<NextEpisodeQuery>,
) -> ApiResult<Json<Value>> {
    let tmdb_id = match query.tmdb_id.as_deref() {
        Some(raw) => Some(
            raw.trim()
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request("Invalid tmdbId"))?,
        ),
        None => None,
    };

    let mut next = library::next_episodes(&state.db, user.id, tmdb_id).await?;

    let data = match tmdb_id {
        Some(id) => serde_json::to_value(next.remove(&id).flatten()).map_err(anyhow::Error::from)?,
        None => serde_json::to_value(&next).map_err(anyhow::Error::from)?,
    };

    Ok(Json(json!({ "success": true, "data": data })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/library/status", get(get_status).post(set_status))
        .route("/library/items", get(list_items))
        .route("/library/watching", get(watching))
        .route(
            "/library/episode-status",
            get(get_episode_status).post(set_episode_status),
        )
        .route("/library/mark-all-episodes", post(mark_all_episodes))
        .route("/library/next-episode", get(next_episode))
}
