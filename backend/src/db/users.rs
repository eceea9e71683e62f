//! Users repository for local accounts

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, uuid_to_str};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of another user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user with a random id
    pub async fn create(&self, user: CreateUser) -> Result<UserRecord> {
        let id = uuid_to_str(Uuid::new_v4());
        let now = now_iso8601();

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, name, password_hash, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Users whose name or email contains `query` (case-insensitive),
    /// excluding `exclude`
    pub async fn search(&self, query: &str, exclude: Uuid, limit: i64) -> Result<Vec<UserSummary>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let users = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, name
            FROM users
            WHERE id != ?
              AND (name LIKE ? ESCAPE '\' OR email LIKE ? ESCAPE '\')
            ORDER BY name
            LIMIT ?
            "#,
        )
        .bind(uuid_to_str(exclude))
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_search_matches_name_or_email_and_skips_caller() {
        let db = Database::connect_in_memory().await.unwrap();
        let users = db.users();
        let mut ids = Vec::new();
        for (email, name) in [
            ("walter@example.com", "Walter White"),
            ("jesse@example.com", "Jesse Pinkman"),
            ("saul@goodman.law", "Saul"),
            ("percent@example.com", "100% Real"),
        ] {
            let user = users
                .create(CreateUser {
                    email: email.to_string(),
                    name: name.to_string(),
                    password_hash: "x".to_string(),
                })
                .await
                .unwrap();
            ids.push(Uuid::parse_str(&user.id).unwrap());
        }

        let found = users.search("WHITE", ids[1], 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Walter White");

        let found = users.search("example", ids[0], 10).await.unwrap();
        let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["100% Real", "Jesse Pinkman"]);

        // `%` is matched literally
        let found = users.search("0%", ids[0], 10).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
