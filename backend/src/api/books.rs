//! Book endpoints: read status and Google Books search

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use super::library::StatusResponse;
use crate::AppState;
use crate::db::ReadStatus;
use crate::services::catalog::upsert_book;
use crate::services::google_books::GoogleBooksSearchResult;
use crate::services::library;

/// Results per Google Books page
const SEARCH_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookStatusQuery {
    pub google_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBookStatusRequest {
    pub google_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub progress: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub start_index: i64,
}

async fn get_book_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<BookStatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let google_id = query
        .google_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing googleId"))?;

    let Some(book) = state.db.books().get_by_google_id(&google_id).await? else {
        return Ok(Json(StatusResponse::untracked()));
    };

    let progress = state.db.books().get_progress(user.id, book.id).await?;
    Ok(Json(StatusResponse {
        status: progress.as_ref().map(|p| p.status.clone()),
        progress: Some(progress.as_ref().map(|p| p.progress).unwrap_or(0)),
        updated_at: progress.map(|p| p.updated_at),
    }))
}

async fn set_book_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<SetBookStatusRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(google_id), Some(raw_status)) = (body.google_id.as_deref(), body.status.as_deref()) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    let status = ReadStatus::parse(raw_status).ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    let record = library::set_book_status(
        &state.db,
        &state.google_books,
        user.id,
        google_id,
        status,
        body.progress,
    )
    .await?;

    Ok(Json(json!({ "success": true, "status": record.status })))
}

/// Search Google Books and mirror every result into the local catalog
async fn search(
    State(state): State<AppState>,
    Query(query): Query<BookSearchQuery>,
) -> ApiResult<Json<GoogleBooksSearchResult>> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;

    let results = state
        .google_books
        .search(&q, query.start_index.max(0), SEARCH_PAGE_SIZE)
        .await?;

    for item in &results.items {
        if let Err(e) = upsert_book(&state.db, item).await {
            warn!(google_id = %item.id, error = %e, "Failed to upsert book");
        }
    }

    Ok(Json(results))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books/status", get(get_book_status).post(set_book_status))
        .route("/books/search", get(search))
}
