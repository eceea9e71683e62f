//! Library operations shared by the REST handlers
//!
//! Status changes, bulk episode updates and the next-episode resolver. These
//! run against the local database and only reach out to the catalog when a
//! show or movie has not been mirrored yet.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{
    BookProgressRecord, Database, ListenStatus, MediaType, NextEpisodeRecord, PodcastProgressRecord,
    ReadStatus, UserProgressRecord, WatchStatus,
};

use super::catalog::{
    ShowCatalog, ensure_media_item, upsert_book, upsert_media_item, upsert_podcast,
    upsert_season_with_episodes,
};
use super::google_books::GoogleBooksClient;
use super::itunes::ItunesClient;

/// Shows considered by the next-episode resolver when no show is given
pub const NEXT_EPISODE_SHOW_LIMIT: i64 = 10;

/// Items in the "continue watching" rail
pub const CONTINUE_WATCHING_LIMIT: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// Set the user's status for a movie or show, mirroring it from the catalog
/// first when needed.
///
/// `progress` defaults to the stored value, or 100 for `completed`.
pub async fn set_media_status(
    db: &Database,
    catalog: &dyn ShowCatalog,
    user_id: Uuid,
    tmdb_id: i64,
    media_type: MediaType,
    status: WatchStatus,
    progress: Option<i64>,
) -> Result<UserProgressRecord> {
    let media_item_id = ensure_media_item(db, catalog, tmdb_id, media_type)
        .await
        .ok_or(LibraryError::NotFound("Media item"))?;

    let progress = match progress {
        Some(progress) => progress.clamp(0, 100),
        None if status == WatchStatus::Completed => 100,
        None => db
            .progress()
            .get(user_id, media_item_id)
            .await?
            .map(|p| p.progress)
            .unwrap_or(0),
    };

    db.progress()
        .upsert(user_id, media_item_id, status, progress)
        .await
}

/// Mark every episode of a show watched or unwatched for a user.
///
/// When the show has no local episodes and a catalog is available, the
/// show, its seasons and their episodes are fetched first. Returns the
/// number of episodes updated. Not transactional: a failure part-way leaves
/// earlier episodes updated.
pub async fn bulk_update_episode_status(
    db: &Database,
    user_id: Uuid,
    tmdb_id: i64,
    watched: bool,
    catalog: Option<&dyn ShowCatalog>,
) -> Result<usize> {
    let mut episode_ids = match db.media_items().find_by_tmdb(tmdb_id, MediaType::Tv).await? {
        Some(show) => db.episodes().list_ids_by_media_item(show.id).await?,
        None => Vec::new(),
    };

    if episode_ids.is_empty()
        && let Some(catalog) = catalog
    {
        let media_item_id = backfill_show(db, catalog, tmdb_id).await?;
        episode_ids = db.episodes().list_ids_by_media_item(media_item_id).await?;
    }

    let progress = db.episode_progress();
    for episode_id in &episode_ids {
        progress.set_watched(user_id, *episode_id, watched, None).await?;
    }

    debug!(tmdb_id, watched, count = episode_ids.len(), "Bulk episode status updated");
    Ok(episode_ids.len())
}

/// Mirror a show with all of its seasons and episodes; returns the media item id
async fn backfill_show(db: &Database, catalog: &dyn ShowCatalog, tmdb_id: i64) -> Result<i64> {
    let show = catalog.tv(tmdb_id).await?;
    let media_item_id = upsert_media_item(db, &show, MediaType::Tv).await?;

    for summary in show.seasons.as_deref().unwrap_or_default() {
        match catalog.season(tmdb_id, summary.season_number).await {
            Ok(season) => {
                upsert_season_with_episodes(db, &season, media_item_id).await?;
            }
            Err(e) => warn!(
                tmdb_id,
                season = summary.season_number,
                error = %e,
                "Failed to fetch season during backfill"
            ),
        }
    }

    Ok(media_item_id)
}

/// Next unwatched episode per show the user is watching.
///
/// With `tmdb_id` only that show is considered (and only if it is in
/// `watching`). Shows with every episode watched map to `None`.
pub async fn next_episodes(
    db: &Database,
    user_id: Uuid,
    tmdb_id: Option<i64>,
) -> Result<BTreeMap<i64, Option<NextEpisodeRecord>>> {
    let limit = if tmdb_id.is_some() { 1 } else { NEXT_EPISODE_SHOW_LIMIT };
    let shows = db.progress().watching_shows(user_id, tmdb_id, limit).await?;

    let mut result = BTreeMap::new();
    for (media_item_id, show_tmdb_id) in shows {
        let next = db
            .episode_progress()
            .next_unwatched(user_id, media_item_id)
            .await?;
        result.insert(show_tmdb_id, next);
    }

    Ok(result)
}

/// Toggle one episode's watched flag; returns the episode's TMDB id
pub async fn set_episode_status(db: &Database, user_id: Uuid, episode_id: i64, watched: bool) -> Result<i64> {
    let episode = db
        .episodes()
        .get_by_id(episode_id)
        .await?
        .ok_or(LibraryError::NotFound("Episode"))?;

    db.episode_progress()
        .set_watched(user_id, episode_id, watched, None)
        .await?;

    Ok(episode.tmdb_id)
}

/// Set the user's read status for a book, fetching it from Google Books
/// when it is not stored yet.
///
/// `progress` is the current page; only negative values are corrected.
pub async fn set_book_status(
    db: &Database,
    books: &GoogleBooksClient,
    user_id: Uuid,
    google_id: &str,
    status: ReadStatus,
    progress: i64,
) -> Result<BookProgressRecord> {
    let book_id = match db.books().get_by_google_id(google_id).await? {
        Some(book) => book.id,
        None => {
            let item = books.get_book(google_id).await?;
            upsert_book(db, &item).await?
        }
    };

    db.books()
        .upsert_progress(user_id, book_id, status, progress.max(0))
        .await
}

/// Set the user's listen status for a podcast, fetching it from iTunes when
/// it is not stored yet
pub async fn set_podcast_status(
    db: &Database,
    itunes: &ItunesClient,
    user_id: Uuid,
    itunes_id: &str,
    status: ListenStatus,
    progress: i64,
) -> Result<PodcastProgressRecord> {
    let podcast_id = match db.podcasts().get_by_itunes_id(itunes_id).await? {
        Some(podcast) => podcast.id,
        None => {
            let item = itunes
                .get_podcast(itunes_id)
                .await?
                .ok_or(LibraryError::NotFound("Podcast"))?;
            upsert_podcast(db, &item).await?
        }
    };

    db.podcasts()
        .upsert_progress(user_id, podcast_id, status, progress.max(0))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateUser, UpsertEpisode, UpsertMediaItem, UpsertSeason};
    use assert_matches::assert_matches;

    async fn create_user(db: &Database) -> Uuid {
        let user = db
            .users()
            .create(CreateUser {
                email: "reader@example.com".to_string(),
                name: "Reader".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        Uuid::parse_str(&user.id).unwrap()
    }

    async fn seed_show(db: &Database) -> (i64, Vec<i64>) {
        let media_item_id = db
            .media_items()
            .upsert(&UpsertMediaItem {
                tmdb_id: 100,
                media_type: MediaType::Tv,
                title: "Show".to_string(),
                original_title: None,
                overview: None,
                poster_path: None,
                backdrop_path: None,
                release_date: None,
                last_air_date: None,
                status: None,
                vote_average: None,
                vote_count: None,
            })
            .await
            .unwrap();

        let season_id = db
            .seasons()
            .upsert(&UpsertSeason {
                tmdb_id: 1000,
                media_item_id,
                season_number: 1,
                name: None,
                overview: None,
                poster_path: None,
                air_date: None,
                episode_count: Some(2),
                vote_average: None,
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for n in 1..=2 {
            ids.push(
                db.episodes()
                    .upsert(&UpsertEpisode {
                        tmdb_id: 10_000 + n,
                        season_id,
                        episode_number: n,
                        name: Some(format!("Episode {}", n)),
                        overview: None,
                        still_path: None,
                        air_date: None,
                        vote_average: None,
                        vote_count: None,
                    })
                    .await
                    .unwrap(),
            );
        }
        (media_item_id, ids)
    }

    #[tokio::test]
    async fn test_bulk_update_without_catalog_counts_local_episodes() {
        let db = Database::connect_in_memory().await.unwrap();
        let user = create_user(&db).await;
        seed_show(&db).await;

        assert_eq!(bulk_update_episode_status(&db, user, 100, true, None).await.unwrap(), 2);
        assert_eq!(bulk_update_episode_status(&db, user, 999, true, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_episode_only_for_watching_shows() {
        let db = Database::connect_in_memory().await.unwrap();
        let user = create_user(&db).await;
        let (media_item_id, episode_ids) = seed_show(&db).await;

        assert!(next_episodes(&db, user, None).await.unwrap().is_empty());

        db.progress()
            .upsert(user, media_item_id, WatchStatus::Watching, 0)
            .await
            .unwrap();
        set_episode_status(&db, user, episode_ids[0], true).await.unwrap();

        let next = next_episodes(&db, user, Some(100)).await.unwrap();
        let episode = next.get(&100).cloned().flatten().unwrap();
        assert_eq!(episode.episode_id, episode_ids[1]);
        assert_eq!(episode.season_number, 1);
    }

    #[tokio::test]
    async fn test_set_episode_status_unknown_episode() {
        let db = Database::connect_in_memory().await.unwrap();
        let err = set_episode_status(&db, Uuid::new_v4(), 42, true).await.unwrap_err();
        assert_matches!(err.downcast_ref::<LibraryError>(), Some(LibraryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_book_status_keeps_page_number() {
        let db = Database::connect_in_memory().await.unwrap();
        let user = create_user(&db).await;
        db.books()
            .upsert(&crate::db::UpsertBook {
                google_id: "vol-1".to_string(),
                title: "A Book".to_string(),
                authors: vec!["Someone".to_string()],
                description: None,
                thumbnail: None,
                published_date: None,
                page_count: Some(412),
                categories: Vec::new(),
                average_rating: None,
                ratings_count: None,
                is_ebook: false,
            })
            .await
            .unwrap();

        let client = GoogleBooksClient::new(None);
        let record = set_book_status(&db, &client, user, "vol-1", ReadStatus::Reading, 250)
            .await
            .unwrap();
        assert_eq!(record.status, "reading");
        assert_eq!(record.progress, 250);

        let record = set_book_status(&db, &client, user, "vol-1", ReadStatus::Reading, -3)
            .await
            .unwrap();
        assert_eq!(record.progress, 0);
    }

    #[tokio::test]
    async fn test_podcast_status_keeps_episode_count() {
        let db = Database::connect_in_memory().await.unwrap();
        let user = create_user(&db).await;
        db.podcasts()
            .upsert(&crate::db::UpsertPodcast {
                itunes_id: Some("555".to_string()),
                listen_notes_id: None,
                collection_name: "A Podcast".to_string(),
                artist_name: "Host".to_string(),
                artwork_url: None,
                feed_url: None,
                description: None,
                total_episodes: Some(320),
                listen_score: None,
                genres: Vec::new(),
            })
            .await
            .unwrap();

        let client = ItunesClient::new();
        let record = set_podcast_status(&db, &client, user, "555", ListenStatus::Listening, 180)
            .await
            .unwrap();
        assert_eq!(record.progress, 180);
    }
}
