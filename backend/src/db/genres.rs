//! Genres a user is interested in, shown on their profile

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{now_iso8601, uuid_to_str};

pub struct GenreRepository {
    pool: SqlitePool,
}

impl GenreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The user's genres in the order they were saved
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<String>> {
        let genres = sqlx::query_scalar::<_, String>(
            "SELECT genre FROM user_genre_interests WHERE user_id = ? ORDER BY id",
        )
        .bind(uuid_to_str(user_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(genres)
    }

    /// Replace the user's genres with `genres` atomically.
    ///
    /// Callers pass a deduplicated list; duplicates would violate the
    /// `(user_id, genre)` key.
    pub async fn replace(&self, user_id: Uuid, genres: &[String]) -> Result<()> {
        let id = uuid_to_str(user_id);
        let now = now_iso8601();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_genre_interests WHERE user_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for genre in genres {
            sqlx::query("INSERT INTO user_genre_interests (user_id, genre, created_at) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(genre)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateUser, Database};

    #[tokio::test]
    async fn test_replace_overwrites_previous_genres() {
        let db = Database::connect_in_memory().await.unwrap();
        let user = db
            .users()
            .create(CreateUser {
                email: "genres@example.com".to_string(),
                name: "Genres".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        let user = Uuid::parse_str(&user.id).unwrap();
        let repo = db.genres();

        repo.replace(user, &["Drama".to_string(), "Sci-Fi".to_string()])
            .await
            .unwrap();
        repo.replace(user, &["Horror".to_string(), "Drama".to_string()])
            .await
            .unwrap();
        assert_eq!(repo.list(user).await.unwrap(), vec!["Horror", "Drama"]);

        repo.replace(user, &[]).await.unwrap();
        assert!(repo.list(user).await.unwrap().is_empty());
    }
}
