//! OAuth account connections to external providers
//!
//! Token columns hold whatever the caller passes in; encryption at rest is
//! applied by [`crate::services::encryption::TokenCipher`] before writing.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, uuid_to_str};

/// Provider key for Trakt.tv connections
pub const TRAKT_PROVIDER: &str = "trakt";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccountConnectionRecord {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub provider_user_id: Option<String>,
    pub provider_username: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct UpsertConnection {
    pub user_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub provider_user_id: Option<String>,
    pub provider_username: Option<String>,
}

pub struct ConnectionRepository {
    pool: SqlitePool,
}

impl ConnectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, provider: &str) -> Result<Option<AccountConnectionRecord>> {
        let record = sqlx::query_as::<_, AccountConnectionRecord>(
            r#"
            SELECT id, user_id, provider, access_token, refresh_token, expires_at,
                   provider_user_id, provider_username, last_synced_at, created_at, updated_at
            FROM account_connections
            WHERE user_id = ? AND provider = ?
            "#,
        )
        .bind(uuid_to_str(user_id))
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Store (or replace) the tokens for a user's provider connection
    pub async fn upsert(&self, input: &UpsertConnection) -> Result<()> {
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO account_connections (
                user_id, provider, access_token, refresh_token, expires_at,
                provider_user_id, provider_username, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                provider_user_id = excluded.provider_user_id,
                provider_username = excluded.provider_username,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid_to_str(input.user_id))
        .bind(&input.provider)
        .bind(&input.access_token)
        .bind(&input.refresh_token)
        .bind(&input.expires_at)
        .bind(&input.provider_user_id)
        .bind(&input.provider_username)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn touch_synced(&self, user_id: Uuid, provider: &str) -> Result<()> {
        sqlx::query(
            "UPDATE account_connections SET last_synced_at = ? WHERE user_id = ? AND provider = ?",
        )
        .bind(now_iso8601())
        .bind(uuid_to_str(user_id))
        .bind(provider)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, user_id: Uuid, provider: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM account_connections WHERE user_id = ? AND provider = ?")
            .bind(uuid_to_str(user_id))
            .bind(provider)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
