//! Catalog endpoints backed by TMDB
//!
//! Details, search and trending are passed through. Season detail mirrors
//! the season into the local catalog so episode ids are stable for watched
//! flags, and falls back to the cached rows when TMDB is unavailable.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::auth::MaybeUser;
use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::db::{EpisodeRecord, MediaType, SeasonRecord};
use crate::services::catalog::{upsert_media_item, upsert_season_with_episodes};
use crate::services::tmdb::{TmdbMediaDetails, TmdbPage};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub window: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeasonEpisode {
    pub id: i64,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub vote_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SeasonDetail {
    pub id: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub season_number: i64,
    pub episode_count: Option<i64>,
    pub episodes: Vec<SeasonEpisode>,
}

impl SeasonDetail {
    fn from_local(season: &SeasonRecord, episodes: Vec<SeasonEpisode>) -> Self {
        Self {
            id: season.tmdb_id,
            name: season.name.clone(),
            overview: season.overview.clone(),
            poster_path: season.poster_path.clone(),
            air_date: season.air_date.clone(),
            season_number: season.season_number,
            episode_count: season.episode_count.or(Some(episodes.len() as i64)),
            episodes,
        }
    }
}

fn season_episode(episode: &EpisodeRecord) -> SeasonEpisode {
    SeasonEpisode {
        id: episode.id,
        episode_number: episode.episode_number,
        name: episode.name.clone(),
        overview: episode.overview.clone(),
        still_path: episode.still_path.clone(),
        air_date: episode.air_date.clone(),
        vote_average: episode.vote_average.map(|v| v as f64 / 10.0),
        watched: None,
    }
}

async fn details(
    State(state): State<AppState>,
    Path((raw_type, tmdb_id)): Path<(String, i64)>,
) -> ApiResult<Json<TmdbMediaDetails>> {
    let item = match MediaType::parse(&raw_type) {
        Some(MediaType::Movie) => state.catalog.movie(tmdb_id).await?,
        Some(MediaType::Tv) => state.catalog.tv(tmdb_id).await?,
        _ => return Err(ApiError::bad_request("Invalid parameters")),
    };

    Ok(Json(item))
}

/// Local season row and its episodes, if the season was mirrored before
async fn cached_season(
    state: &AppState,
    tv_id: i64,
    season_number: i64,
) -> anyhow::Result<Option<(SeasonRecord, Vec<EpisodeRecord>)>> {
    let Some(show) = state.db.media_items().find_by_tmdb(tv_id, MediaType::Tv).await? else {
        return Ok(None);
    };
    let Some(season) = state.db.seasons().find_by_number(show.id, season_number).await? else {
        return Ok(None);
    };
    let episodes = state.db.episodes().list_by_season(season.id).await?;
    Ok(Some((season, episodes)))
}

/// Fetch the season from the catalog and mirror it (and the show, if new)
async fn refresh_season(state: &AppState, tv_id: i64, season_number: i64) -> anyhow::Result<i64> {
    let season = state.catalog.season(tv_id, season_number).await?;

    let media_item_id = match state.db.media_items().find_by_tmdb(tv_id, MediaType::Tv).await? {
        Some(show) => show.id,
        None => {
            let show = state.catalog.tv(tv_id).await?;
            upsert_media_item(&state.db, &show, MediaType::Tv).await?
        }
    };

    upsert_season_with_episodes(&state.db, &season, media_item_id).await
}

async fn season_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path((tv_id, season_number)): Path<(i64, i64)>,
) -> ApiResult<Json<SeasonDetail>> {
    if let Err(e) = refresh_season(&state, tv_id, season_number).await {
        warn!(tv_id, season_number, error = %e, "Season fetch failed, using cached data");
    }

    let (season, episodes) = cached_season(&state, tv_id, season_number)
        .await?
        .ok_or_else(|| ApiError::not_found("Season not found"))?;

    let mut episodes: Vec<SeasonEpisode> = episodes.iter().map(season_episode).collect();

    if let Some(user) = user
        && !episodes.is_empty()
    {
        let ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();
        let watched: HashMap<i64, bool> = state.db.episode_progress().statuses(user.id, &ids).await?;
        for episode in &mut episodes {
            episode.watched = watched.get(&episode.id).copied();
        }
    }

    Ok(Json(SeasonDetail::from_local(&season, episodes)))
}

/// Multi search; movie and TV hits are mirrored into the local catalog
async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Json<TmdbPage>> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;

    let mut page = state.tmdb.search_multi(&q, query.page.unwrap_or(1).max(1)).await?;

    page.results.retain(|item| {
        item.media_type
            .as_deref()
            .and_then(MediaType::parse)
            .is_some_and(|t| t.is_screen())
    });

    for item in &page.results {
        let Some(media_type) = item.media_type.as_deref().and_then(MediaType::parse) else {
            continue;
        };
        if let Err(e) = upsert_media_item(&state.db, item, media_type).await {
            warn!(tmdb_id = item.id, error = %e, "Failed to cache search result");
        }
    }

    Ok(Json(page))
}

async fn trending(State(state): State<AppState>, Query(query): Query<TrendingQuery>) -> ApiResult<Json<TmdbPage>> {
    let media_type = match query.media_type.as_deref() {
        None => "all",
        Some(t @ ("all" | "movie" | "tv")) => t,
        Some(_) => return Err(ApiError::bad_request("Invalid type parameter")),
    };
    let window = match query.window.as_deref() {
        None => "week",
        Some(w @ ("day" | "week")) => w,
        Some(_) => return Err(ApiError::bad_request("Invalid window parameter")),
    };

    Ok(Json(state.tmdb.trending(media_type, window).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/media/search", get(search))
        .route("/media/trending", get(trending))
        .route("/media/tv/{id}/season/{season_number}", get(season_detail))
        .route("/media/{media_type}/{id}", get(details))
}
