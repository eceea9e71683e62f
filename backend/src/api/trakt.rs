//! Trakt account endpoints: OAuth connect/callback, status, disconnect, sync

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::auth::{AuthUser, CsrfGuard};
use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::db::{AccountConnectionRecord, TRAKT_PROVIDER, UpsertConnection};

const PROFILE_PATH: &str = "/profile";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
}

impl ConnectionStatus {
    fn disconnected() -> Self {
        Self {
            connected: false,
            username: None,
            user_id: None,
            connected_at: None,
            last_synced_at: None,
            expired: None,
        }
    }

    fn from_record(record: AccountConnectionRecord, now: DateTime<Utc>) -> Self {
        let expired = record
            .expires_at
            .as_deref()
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
            .is_some_and(|at| at.with_timezone(&Utc) < now);

        Self {
            connected: true,
            username: record.provider_username,
            user_id: record.provider_user_id,
            connected_at: Some(record.created_at),
            last_synced_at: record.last_synced_at,
            expired: Some(expired),
        }
    }
}

fn profile_redirect(query: &str) -> Redirect {
    Redirect::to(&format!("{}?{}", PROFILE_PATH, query))
}

async fn connect(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Value>> {
    if !state.trakt.is_configured() {
        return Err(ApiError::bad_request("Trakt is not configured"));
    }

    let oauth_state = state.auth.issue_state_token(user.id)?;
    let url = state.trakt.authorize_url(&oauth_state)?;

    Ok(Json(json!({ "url": url })))
}

/// Exchange the code and store the connection for `user_id`
async fn complete_connection(state: &AppState, user_id: Uuid, code: &str) -> Result<(), &'static str> {
    let tokens = state.trakt.exchange_code(code).await.map_err(|e| {
        error!(error = %e, "Trakt token exchange failed");
        "trakt_token_failed"
    })?;

    let me = state.trakt.get_me(&tokens.access_token).await.map_err(|e| {
        error!(error = %e, "Failed to fetch Trakt profile");
        "trakt_user_failed"
    })?;

    let username = me.username;
    let provider_user_id = me.ids.and_then(|ids| ids.slug);

    let store = async {
        let access_token = state.cipher.seal(&tokens.access_token)?;
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .map(|t| state.cipher.seal(t))
            .transpose()?;
        let expires_at = tokens
            .expires_in
            .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());

        state
            .db
            .connections()
            .upsert(&UpsertConnection {
                user_id,
                provider: TRAKT_PROVIDER.to_string(),
                access_token,
                refresh_token,
                expires_at,
                provider_user_id,
                provider_username: Some(username.clone()),
            })
            .await
            .context("Failed to store Trakt connection")
    };

    store.await.map_err(|e: anyhow::Error| {
        error!(error = %e, "Failed to save Trakt connection");
        "trakt_error"
    })?;

    info!(user_id = %user_id, trakt_user = %username, "Trakt account connected");
    Ok(())
}

/// OAuth redirect target; the browser lands here without a Bearer token,
/// so the user is recovered from the signed `state`
async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Redirect {
    if let Some(err) = query.error {
        warn!(error = %err, "Trakt authorization denied");
        return profile_redirect("error=trakt_auth_failed");
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return profile_redirect("error=trakt_auth_failed");
    };

    let user_id = match state.auth.verify_state_token(&oauth_state) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Invalid Trakt OAuth state");
            return profile_redirect("error=trakt_state_mismatch");
        }
    };

    if !state.trakt.is_configured() {
        return profile_redirect("error=trakt_not_configured");
    }

    match complete_connection(&state, user_id, &code).await {
        Ok(()) => profile_redirect("trakt=connected"),
        Err(reason) => profile_redirect(&format!("error={}", reason)),
    }
}

async fn status(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<ConnectionStatus>> {
    let status = match state.db.connections().get(user.id, TRAKT_PROVIDER).await? {
        Some(record) => ConnectionStatus::from_record(record, Utc::now()),
        None => ConnectionStatus::disconnected(),
    };

    Ok(Json(status))
}

async fn disconnect(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    _csrf: CsrfGuard,
) -> ApiResult<Json<Value>> {
    if let Some(record) = state.db.connections().get(user.id, TRAKT_PROVIDER).await? {
        match state.cipher.open(&record.access_token) {
            Ok(token) => {
                if let Err(e) = state.trakt.revoke(&token).await {
                    warn!(error = %e, "Trakt token revoke failed, removing connection anyway");
                }
            }
            Err(e) => warn!(error = %e, "Stored Trakt token unreadable, skipping revoke"),
        }
    }

    state.db.connections().delete(user.id, TRAKT_PROVIDER).await?;
    info!(user_id = %user.id, "Trakt account disconnected");

    Ok(Json(json!({ "success": true })))
}

async fn sync(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Value>> {
    let report = state.sync_service().sync_all(user.id).await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/trakt/connect", get(connect))
        .route("/auth/trakt/callback", get(callback))
        .route("/auth/trakt/status", get(status))
        .route("/auth/trakt/disconnect", post(disconnect))
        .route("/auth/trakt/sync", post(sync))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: Option<&str>) -> AccountConnectionRecord {
        AccountConnectionRecord {
            id: 1,
            user_id: Uuid::new_v4().to_string(),
            provider: TRAKT_PROVIDER.to_string(),
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: expires_at.map(str::to_string),
            provider_user_id: Some("sean".to_string()),
            provider_username: Some("Sean".to_string()),
            last_synced_at: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_expired_flag() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let past = ConnectionStatus::from_record(record(Some("2024-05-01T00:00:00+00:00")), now);
        assert_eq!(past.expired, Some(true));

        let future = ConnectionStatus::from_record(record(Some("2024-07-01T00:00:00+00:00")), now);
        assert_eq!(future.expired, Some(false));

        let unknown = ConnectionStatus::from_record(record(None), now);
        assert_eq!(unknown.expired, Some(false));
        assert_eq!(unknown.username.as_deref(), Some("Sean"));
    }

    #[test]
    fn test_disconnected_serializes_flag_only() {
        let value = serde_json::to_value(ConnectionStatus::disconnected()).unwrap();
        assert_eq!(value, json!({ "connected": false }));
    }
}
