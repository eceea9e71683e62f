//! Profile endpoints: genre interests

use std::collections::HashSet;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use serde_json::Value;

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use crate::AppState;

pub const MAX_GENRES: usize = 12;
pub const MAX_GENRE_LEN: usize = 40;

#[derive(Debug, Serialize)]
pub struct GenresResponse {
    pub genres: Vec<String>,
}

/// Trim, drop empty/overlong/non-string entries and duplicates (first one
/// wins), then keep at most [`MAX_GENRES`]
pub fn normalize_genres(input: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|g| !g.is_empty() && g.chars().count() <= MAX_GENRE_LEN)
        .filter(|g| seen.insert(g.to_string()))
        .take(MAX_GENRES)
        .map(str::to_string)
        .collect()
}

async fn get_genres(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<GenresResponse>> {
    let genres = state.db.genres().list(user.id).await?;
    Ok(Json(GenresResponse { genres }))
}

async fn set_genres(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<Value>,
) -> ApiResult<Json<GenresResponse>> {
    let input = body
        .get("genres")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("Invalid genres"))?;

    let genres = normalize_genres(input);
    state.db.genres().replace(user.id, &genres).await?;

    Ok(Json(GenresResponse { genres }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/profile/genres", get(get_genres).post(set_genres))
}
