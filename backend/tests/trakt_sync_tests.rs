//! Integration tests for Trakt reconciliation and the library operations it
//! feeds: status precedence, the episode cascade, pagination and the
//! next-episode resolver.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use common::{
    FakeCatalog, FakeTrakt, connect_trakt, create_user, listed_movie, rated_movie, watched_episode,
    watched_movie,
};
use traktdb::db::{Database, MediaType, WatchStatus};
use traktdb::services::catalog::upsert_media_item;
use traktdb::services::library;
use traktdb::services::tmdb::TmdbMediaDetails;
use traktdb::services::trakt_sync::PAGE_LIMIT;
use traktdb::services::{SyncError, TokenCipher, TraktSyncService};

fn sync_service(db: &Database, trakt: Arc<FakeTrakt>, catalog: Arc<FakeCatalog>) -> TraktSyncService {
    TraktSyncService::new(db.clone(), trakt, catalog, TokenCipher::plaintext())
}

async fn movie_status(db: &Database, user: uuid::Uuid, tmdb_id: i64) -> Option<String> {
    let item = db
        .media_items()
        .find_by_tmdb(tmdb_id, MediaType::Movie)
        .await
        .unwrap()?;
    db.progress()
        .get(user, item.id)
        .await
        .unwrap()
        .map(|p| p.status)
}

// ============================================================================
// Catalog upserts
// ============================================================================

#[tokio::test]
async fn test_upsert_twice_keeps_identity_latest_values_win() {
    let db = Database::connect_in_memory().await.unwrap();

    let mut movie = TmdbMediaDetails {
        id: 603,
        title: Some("The Matrix".to_string()),
        overview: Some("old overview".to_string()),
        ..Default::default()
    };
    let first = upsert_media_item(&db, &movie, MediaType::Movie).await.unwrap();

    movie.title = Some("The Matrix (Remastered)".to_string());
    movie.overview = Some("new overview".to_string());
    let second = upsert_media_item(&db, &movie, MediaType::Movie).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(db.media_items().count().await.unwrap(), 1);

    let stored = db
        .media_items()
        .find_by_tmdb(603, MediaType::Movie)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "The Matrix (Remastered)");
    assert_eq!(stored.overview.as_deref(), Some("new overview"));
}

// ============================================================================
// Status precedence
// ============================================================================

#[tokio::test]
async fn test_watched_history_completes_planned_movie() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "history@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_movie(550, "Fight Club"));

    library::set_media_status(
        &db,
        catalog.as_ref(),
        user,
        550,
        MediaType::Movie,
        WatchStatus::PlanToWatch,
        None,
    )
    .await
    .unwrap();
    assert_eq!(movie_status(&db, user, 550).await.as_deref(), Some("plan_to_watch"));

    let mut trakt = FakeTrakt::default();
    trakt.history.insert("movies", vec![watched_movie(550, "2024-01-01T21:00:00.000Z")]);

    let report = sync_service(&db, Arc::new(trakt), catalog).sync_all(user).await.unwrap();

    assert_eq!(report.movies.applied, 1);
    assert_eq!(movie_status(&db, user, 550).await.as_deref(), Some("completed"));

    let item = db.media_items().find_by_tmdb(550, MediaType::Movie).await.unwrap().unwrap();
    assert_eq!(db.progress().get(user, item.id).await.unwrap().unwrap().progress, 100);
}

#[tokio::test]
async fn test_watchlist_never_downgrades_completed_movie() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "watchlist@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_movie(550, "Fight Club").with_movie(13, "Forrest Gump"));

    library::set_media_status(
        &db,
        catalog.as_ref(),
        user,
        550,
        MediaType::Movie,
        WatchStatus::Completed,
        None,
    )
    .await
    .unwrap();

    let mut trakt = FakeTrakt::default();
    trakt.watchlist.insert("movies", vec![listed_movie(550), listed_movie(13)]);

    let report = sync_service(&db, Arc::new(trakt), catalog).sync_all(user).await.unwrap();

    assert_eq!(report.watchlist_movies.applied, 2);
    assert_eq!(movie_status(&db, user, 550).await.as_deref(), Some("completed"));
    assert_eq!(movie_status(&db, user, 13).await.as_deref(), Some("plan_to_watch"));
}

#[tokio::test]
async fn test_ratings_replace_previous_value() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "ratings@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_movie(550, "Fight Club"));

    for rating in [6, 9] {
        let mut trakt = FakeTrakt::default();
        trakt.ratings.insert("movies", vec![rated_movie(550, rating)]);
        sync_service(&db, Arc::new(trakt), catalog.clone())
            .sync_all(user)
            .await
            .unwrap();
    }

    let item = db.media_items().find_by_tmdb(550, MediaType::Movie).await.unwrap().unwrap();
    let rating = db.ratings().get(user, item.id).await.unwrap().unwrap();
    assert_eq!(rating.rating, 9);
}

// ============================================================================
// Episode cascade
// ============================================================================

#[tokio::test]
async fn test_episode_history_backfills_show_and_fetches_season_once() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "episodes@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_show(1396, "Breaking Bad", &[3, 2]));

    let mut trakt = FakeTrakt::default();
    trakt.history.insert(
        "episodes",
        vec![
            watched_episode(1396, 1, 1),
            watched_episode(1396, 1, 2),
            watched_episode(1396, 1, 9),
        ],
    );

    let report = sync_service(&db, Arc::new(trakt), catalog.clone())
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(report.episodes.applied, 2);
    assert_eq!(report.episodes.skipped, 1);
    assert_eq!(catalog.season_call_count(), 1);

    let show = db.media_items().find_by_tmdb(1396, MediaType::Tv).await.unwrap().unwrap();
    let progress = db.progress().get(user, show.id).await.unwrap().unwrap();
    assert_eq!(progress.status, "watching");

    // S01E03 is the first unwatched episode
    let next = library::next_episodes(&db, user, Some(1396)).await.unwrap();
    let episode = next.get(&1396).cloned().flatten().unwrap();
    assert_eq!((episode.season_number, episode.episode_number), (1, 3));
}

#[tokio::test]
async fn test_episode_history_keeps_completed_show() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "done@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_show(1396, "Breaking Bad", &[2]));

    library::set_media_status(&db, catalog.as_ref(), user, 1396, MediaType::Tv, WatchStatus::Completed, None)
        .await
        .unwrap();

    let mut trakt = FakeTrakt::default();
    trakt.history.insert("episodes", vec![watched_episode(1396, 1, 1)]);
    sync_service(&db, Arc::new(trakt), catalog).sync_all(user).await.unwrap();

    let show = db.media_items().find_by_tmdb(1396, MediaType::Tv).await.unwrap().unwrap();
    assert_eq!(db.progress().get(user, show.id).await.unwrap().unwrap().status, "completed");
}

// ============================================================================
// Next episode
// ============================================================================

async fn watching_show(db: &Database, catalog: &FakeCatalog, user: uuid::Uuid, tmdb_id: i64) {
    library::set_media_status(db, catalog, user, tmdb_id, MediaType::Tv, WatchStatus::Watching, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mark_all_watched_leaves_no_next_episode() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "markall@example.com").await;
    let catalog = FakeCatalog::default().with_show(1399, "Game of Thrones", &[3, 3]);
    watching_show(&db, &catalog, user, 1399).await;

    let count = library::bulk_update_episode_status(&db, user, 1399, true, Some(&catalog))
        .await
        .unwrap();
    assert_eq!(count, 6);

    let next = library::next_episodes(&db, user, Some(1399)).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next.get(&1399).cloned().flatten(), None);
}

#[tokio::test]
async fn test_unwatching_one_episode_makes_it_next() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "unwatch@example.com").await;
    let catalog = FakeCatalog::default().with_show(1399, "Game of Thrones", &[3, 3]);
    watching_show(&db, &catalog, user, 1399).await;

    library::bulk_update_episode_status(&db, user, 1399, true, Some(&catalog))
        .await
        .unwrap();

    let show = db.media_items().find_by_tmdb(1399, MediaType::Tv).await.unwrap().unwrap();
    let season_two = db.seasons().find_by_number(show.id, 2).await.unwrap().unwrap();
    let target = db.episodes().find_by_number(season_two.id, 2).await.unwrap().unwrap();

    library::set_episode_status(&db, user, target.id, false).await.unwrap();

    let next = library::next_episodes(&db, user, None).await.unwrap();
    let episode = next.get(&1399).cloned().flatten().unwrap();
    assert_eq!(episode.episode_id, target.id);
    assert_eq!((episode.season_number, episode.episode_number), (2, 2));
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_short_page_stops_pagination() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "pages@example.com").await;
    connect_trakt(&db, user, "token").await;

    // 150 unknown movies: a full first page, a half second page
    let history = (1..=150).map(|id| watched_movie(id, "2024-01-01T00:00:00.000Z")).collect();
    let mut trakt = FakeTrakt::default();
    trakt.history.insert("movies", history);
    let trakt = Arc::new(trakt);

    let report = sync_service(&db, trakt.clone(), Arc::new(FakeCatalog::default()))
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(trakt.pages_requested("history", "movies"), vec![1, 2]);
    assert_eq!(report.movies.pages, 2);
    assert_eq!(report.movies.skipped, 150);

    // Empty collections stop after their first page
    assert_eq!(trakt.pages_requested("watchlist", "shows"), vec![1]);
}

#[tokio::test]
async fn test_exact_full_page_requests_one_more() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "full@example.com").await;
    connect_trakt(&db, user, "token").await;

    let history = (1..=PAGE_LIMIT as i64)
        .map(|id| watched_movie(id, "2024-01-01T00:00:00.000Z"))
        .collect();
    let mut trakt = FakeTrakt::default();
    trakt.history.insert("movies", history);
    let trakt = Arc::new(trakt);

    sync_service(&db, trakt.clone(), Arc::new(FakeCatalog::default()))
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(trakt.pages_requested("history", "movies"), vec![1, 2]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_failed_season_fetch_fails_one_item_and_sync_continues() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "flaky-season@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(
        FakeCatalog::default()
            .with_show(1399, "Game of Thrones", &[2])
            .with_show(1396, "Breaking Bad", &[2])
            .with_movie(603, "The Matrix")
            .with_movie(27205, "Inception")
            .failing_season(1399, 1, u32::MAX),
    );

    let mut trakt = FakeTrakt::default();
    trakt.history.insert(
        "episodes",
        vec![
            watched_episode(1399, 1, 1),
            watched_episode(1396, 1, 1),
            watched_episode(1396, 1, 2),
        ],
    );
    trakt.watchlist.insert("movies", vec![listed_movie(603)]);
    trakt.ratings.insert("movies", vec![rated_movie(27205, 9)]);

    let report = sync_service(&db, Arc::new(trakt), catalog)
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(report.episodes.failed, 1);
    assert_eq!(report.episodes.applied, 2);
    assert_eq!(report.watchlist_movies.applied, 1);
    assert_eq!(report.rating_movies.applied, 1);

    // Both Breaking Bad episodes landed after the Game of Thrones failure
    let next = library::next_episodes(&db, user, Some(1396)).await.unwrap();
    assert_eq!(next.get(&1396), Some(&None));
    assert_eq!(movie_status(&db, user, 603).await.as_deref(), Some("plan_to_watch"));
}

#[tokio::test]
async fn test_transient_season_failure_is_retried_by_next_episode() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "retry-season@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(
        FakeCatalog::default()
            .with_show(1396, "Breaking Bad", &[3])
            .failing_season(1396, 1, 1),
    );

    let mut trakt = FakeTrakt::default();
    trakt.history.insert(
        "episodes",
        vec![
            watched_episode(1396, 1, 1),
            watched_episode(1396, 1, 2),
            watched_episode(1396, 1, 3),
        ],
    );

    let report = sync_service(&db, Arc::new(trakt), catalog.clone())
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(report.episodes.failed, 1);
    assert_eq!(report.episodes.applied, 2);
    assert_eq!(catalog.season_call_count(), 2);
}

#[tokio::test]
async fn test_failed_page_ends_only_that_collection() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "flaky-pages@example.com").await;
    connect_trakt(&db, user, "token").await;
    let catalog = Arc::new(FakeCatalog::default().with_movie(27205, "Inception"));

    // A full first page of unknown movies, then an error on page 2
    let history = (1..=150).map(|id| watched_movie(id, "2024-01-01T00:00:00.000Z")).collect();
    let mut trakt = FakeTrakt::default();
    trakt.history.insert("movies", history);
    trakt.ratings.insert("movies", vec![rated_movie(27205, 8)]);
    trakt.fail_page("history", "movies", 2);
    trakt.fail_page("watchlist", "movies", 1);
    let trakt = Arc::new(trakt);

    let report = sync_service(&db, trakt.clone(), catalog)
        .sync_all(user)
        .await
        .unwrap();

    assert_eq!(trakt.pages_requested("history", "movies"), vec![1, 2]);
    assert_eq!(report.movies.pages, 1);
    assert_eq!(report.movies.skipped, usize::try_from(PAGE_LIMIT).unwrap());

    assert_eq!(trakt.pages_requested("watchlist", "movies"), vec![1]);
    assert_eq!(report.watchlist_movies.pages, 0);

    // Later collections still run
    assert_eq!(trakt.pages_requested("history", "episodes"), vec![1]);
    assert_eq!(trakt.pages_requested("watchlist", "shows"), vec![1]);
    assert_eq!(report.rating_movies.applied, 1);

    let item = db
        .media_items()
        .find_by_tmdb(27205, MediaType::Movie)
        .await
        .unwrap()
        .unwrap();
    let rating = db.ratings().get(user, item.id).await.unwrap().unwrap();
    assert_eq!(rating.rating, 8);
}

// ============================================================================
// Connection state
// ============================================================================

#[tokio::test]
async fn test_sync_requires_connection() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "nobody@example.com").await;
    let trakt = Arc::new(FakeTrakt::default());

    let result = sync_service(&db, trakt.clone(), Arc::new(FakeCatalog::default()))
        .sync_all(user)
        .await;

    assert_matches!(result, Err(SyncError::NotConnected));
    assert!(trakt.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_stamps_last_synced_at() {
    let db = Database::connect_in_memory().await.unwrap();
    let user = create_user(&db, "stamp@example.com").await;
    connect_trakt(&db, user, "token").await;

    sync_service(&db, Arc::new(FakeTrakt::default()), Arc::new(FakeCatalog::default()))
        .sync_all(user)
        .await
        .unwrap();

    let connection = db
        .connections()
        .get(user, traktdb::db::TRAKT_PROVIDER)
        .await
        .unwrap()
        .unwrap();
    assert!(connection.last_synced_at.is_some());
}
