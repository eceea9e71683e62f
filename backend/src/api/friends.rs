//! Friends: requests, acceptance, removal and user lookup

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::db::{FriendshipStatus, FriendshipWithUser, UserSummary};

/// Shortest query `/users/search` runs
const MIN_USER_QUERY_LEN: usize = 3;
const USER_SEARCH_LIMIT: i64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub friendship_id: i64,
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize)]
pub struct FriendLists {
    pub friends: Vec<Friend>,
    /// Pending requests sent to the caller
    pub incoming: Vec<Friend>,
    /// Pending requests the caller sent
    pub outgoing: Vec<Friend>,
}

impl FriendLists {
    pub fn from_rows(caller: &str, rows: Vec<FriendshipWithUser>) -> Self {
        let mut lists = FriendLists::default();
        for row in rows {
            let status = FriendshipStatus::parse(&row.status);
            let outgoing = row.user_id == caller;
            let friend = Friend {
                friendship_id: row.friendship_id,
                id: row.other_id,
                name: row.other_name,
                created_at: row.created_at,
            };
            match status {
                Some(FriendshipStatus::Accepted) => lists.friends.push(friend),
                Some(FriendshipStatus::Pending) if outgoing => lists.outgoing.push(friend),
                Some(FriendshipStatus::Pending) => lists.incoming.push(friend),
                None => {}
            }
        }
        lists
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub target_user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipBody {
    pub friendship_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub q: Option<String>,
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<FriendLists>> {
    let rows = state.db.friendships().list_for_user(user.id).await?;
    Ok(Json(FriendLists::from_rows(&user.id.to_string(), rows)))
}

async fn request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<FriendRequestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let target = body
        .target_user_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .filter(|id| *id != user.id)
        .ok_or_else(|| ApiError::bad_request("Invalid target user"))?;

    if state.db.users().get_by_id(target).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let friendships = state.db.friendships();
    if friendships.find_between(user.id, target).await?.is_some() {
        return Err(ApiError::Conflict("Friendship or request already exists".to_string()));
    }

    let record = friendships.create_request(user.id, target).await?;
    info!(friendship_id = record.id, from = %user.id, to = %target, "Friend request sent");

    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

async fn accept(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<FriendshipBody>,
) -> ApiResult<Json<Value>> {
    let friendship_id = body
        .friendship_id
        .ok_or_else(|| ApiError::bad_request("Missing friendshipId"))?;

    if !state.db.friendships().accept(friendship_id, user.id).await? {
        return Err(ApiError::not_found("Request not found or invalid"));
    }

    Ok(Json(json!({ "success": true })))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
    Json(body): Json<FriendshipBody>,
) -> ApiResult<Json<Value>> {
    let friendship_id = body
        .friendship_id
        .ok_or_else(|| ApiError::bad_request("Missing friendshipId"))?;

    if !state.db.friendships().remove(friendship_id, user.id).await? {
        return Err(ApiError::not_found("Friendship not found"));
    }

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Serialize)]
pub struct UserSearchResponse {
    pub users: Vec<UserSummary>,
}

/// Find other users by name or email; short queries return nothing
async fn search_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UserSearchQuery>,
) -> ApiResult<Json<UserSearchResponse>> {
    let q = query.q.unwrap_or_default();
    if q.chars().count() < MIN_USER_QUERY_LEN {
        return Ok(Json(UserSearchResponse { users: Vec::new() }));
    }

    let users = state.db.users().search(&q, user.id, USER_SEARCH_LIMIT).await?;
    Ok(Json(UserSearchResponse { users }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friends", get(list))
        .route("/friends/request", post(request))
        .route("/friends/accept", post(accept))
        .route("/friends/remove", post(remove))
        .route("/users/search", get(search_users))
}
