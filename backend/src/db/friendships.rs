//! Friend requests and friendships between local users
//!
//! A request is one row owned by the requester (`user_id`) and addressed to
//! `friend_id`. Accepting flips the same row to `accepted`; there is never a
//! second row for the reverse direction.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, uuid_to_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "pending",
            FriendshipStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FriendshipStatus::Pending),
            "accepted" => Some(FriendshipStatus::Accepted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipRecord {
    pub id: i64,
    pub user_id: String,
    pub friend_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A friendship row joined with the user on the other side
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FriendshipWithUser {
    pub friendship_id: i64,
    /// The requester
    pub user_id: String,
    pub status: String,
    pub created_at: String,
    pub other_id: String,
    pub other_name: String,
}

const FRIENDSHIP_COLUMNS: &str = "id, user_id, friend_id, status, created_at, updated_at";

pub struct FriendshipRepository {
    pool: SqlitePool,
}

impl FriendshipRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every friendship or request involving `user_id`, oldest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<FriendshipWithUser>> {
        let id = uuid_to_str(user_id);
        let rows = sqlx::query_as::<_, FriendshipWithUser>(
            r#"
            SELECT f.id AS friendship_id, f.user_id, f.status, f.created_at,
                   u.id AS other_id, u.name AS other_name
            FROM friendships f
            JOIN users u
              ON u.id = CASE WHEN f.user_id = ? THEN f.friend_id ELSE f.user_id END
            WHERE f.user_id = ? OR f.friend_id = ?
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(&id)
        .bind(&id)
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The row linking two users, in either direction
    pub async fn find_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendshipRecord>> {
        let (a, b) = (uuid_to_str(a), uuid_to_str(b));
        let record = sqlx::query_as::<_, FriendshipRecord>(&format!(
            r#"
            SELECT {}
            FROM friendships
            WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)
            LIMIT 1
            "#,
            FRIENDSHIP_COLUMNS
        ))
        .bind(&a)
        .bind(&b)
        .bind(&b)
        .bind(&a)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Store a pending request from `user_id` to `friend_id`
    pub async fn create_request(&self, user_id: Uuid, friend_id: Uuid) -> Result<FriendshipRecord> {
        let now = now_iso8601();
        let record = sqlx::query_as::<_, FriendshipRecord>(&format!(
            r#"
            INSERT INTO friendships (user_id, friend_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            FRIENDSHIP_COLUMNS
        ))
        .bind(uuid_to_str(user_id))
        .bind(uuid_to_str(friend_id))
        .bind(FriendshipStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Accept a pending request addressed to `recipient`.
    ///
    /// Returns false when no such pending request exists.
    pub async fn accept(&self, friendship_id: i64, recipient: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE friendships
            SET status = ?, updated_at = ?
            WHERE id = ? AND friend_id = ? AND status = ?
            "#,
        )
        .bind(FriendshipStatus::Accepted.as_str())
        .bind(now_iso8601())
        .bind(friendship_id)
        .bind(uuid_to_str(recipient))
        .bind(FriendshipStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a friendship or request that `user_id` is part of
    pub async fn remove(&self, friendship_id: i64, user_id: Uuid) -> Result<bool> {
        let id = uuid_to_str(user_id);
        let result = sqlx::query("DELETE FROM friendships WHERE id = ? AND (user_id = ? OR friend_id = ?)")
            .bind(friendship_id)
            .bind(&id)
            .bind(&id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateUser, Database};

    async fn user(db: &Database, email: &str, name: &str) -> Uuid {
        let record = db
            .users()
            .create(CreateUser {
                email: email.to_string(),
                name: name.to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        Uuid::parse_str(&record.id).unwrap()
    }

    #[tokio::test]
    async fn test_request_accept_remove() {
        let db = Database::connect_in_memory().await.unwrap();
        let alice = user(&db, "alice@example.com", "Alice").await;
        let bob = user(&db, "bob@example.com", "Bob").await;
        let repo = db.friendships();

        let request = repo.create_request(alice, bob).await.unwrap();
        assert_eq!(request.status, "pending");
        assert_eq!(repo.find_between(bob, alice).await.unwrap().unwrap().id, request.id);

        // Only the recipient can accept
        assert!(!repo.accept(request.id, alice).await.unwrap());
        assert!(repo.accept(request.id, bob).await.unwrap());
        assert!(!repo.accept(request.id, bob).await.unwrap());

        let listed = repo.list_for_user(alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].other_name, "Bob");
        assert_eq!(FriendshipStatus::parse(&listed[0].status), Some(FriendshipStatus::Accepted));

        let carol = user(&db, "carol@example.com", "Carol").await;
        assert!(!repo.remove(request.id, carol).await.unwrap());
        assert!(repo.remove(request.id, bob).await.unwrap());
        assert!(repo.find_between(alice, bob).await.unwrap().is_none());
    }
}
