//! Catalog upserts: provider payloads mapped into local catalog rows
//!
//! Every helper here is idempotent. Provider identity (TMDB id + type,
//! Google volume id, iTunes/ListenNotes id, feed guid) is the conflict key
//! and mutable fields are overwritten with the latest payload.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::db::{
    Database, MediaType, UpsertBook, UpsertEpisode, UpsertMediaItem, UpsertPodcast,
    UpsertPodcastEpisode, UpsertSeason,
};

use super::google_books::GoogleBookItem;
use super::itunes::ItunesPodcast;
use super::listen_notes::ListenNotesPodcast;
use super::podcast_feed::{ParsedFeed, PodcastFeedClient};
use super::tmdb::{TmdbEpisode, TmdbMediaDetails, TmdbSeason};

/// Read access to the movie/TV catalog.
///
/// Implemented by [`super::tmdb::TmdbClient`]; the sync and bulk-update paths
/// only depend on this trait.
#[async_trait]
pub trait ShowCatalog: Send + Sync {
    async fn movie(&self, tmdb_id: i64) -> Result<TmdbMediaDetails>;

    /// Show details including the season list
    async fn tv(&self, tmdb_id: i64) -> Result<TmdbMediaDetails>;

    /// One season including its episodes
    async fn season(&self, tv_id: i64, season_number: i64) -> Result<TmdbSeason>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} item has no identifier")]
    MissingIdentifier(&'static str),
}

/// Provider averages are stored as integers scaled by ten
fn scale_rating(value: Option<f64>) -> Option<i64> {
    value.filter(|v| *v != 0.0).map(|v| (v * 10.0).round() as i64)
}

pub fn media_item_input(item: &TmdbMediaDetails, media_type: MediaType) -> UpsertMediaItem {
    UpsertMediaItem {
        tmdb_id: item.id,
        media_type,
        title: item.display_title(),
        original_title: item.original_display_title(),
        overview: item.overview.clone(),
        poster_path: item.poster_path.clone(),
        backdrop_path: item.backdrop_path.clone(),
        release_date: item.effective_release_date(),
        last_air_date: item.last_air_date.clone().filter(|d| !d.is_empty()),
        status: item.status.clone(),
        vote_average: scale_rating(item.vote_average),
        vote_count: item.vote_count,
    }
}

/// Insert or update a movie/show keyed by `(tmdb_id, type)`; returns the local id
pub async fn upsert_media_item(db: &Database, item: &TmdbMediaDetails, media_type: MediaType) -> Result<i64> {
    db.media_items().upsert(&media_item_input(item, media_type)).await
}

pub fn season_input(season: &TmdbSeason, media_item_id: i64) -> UpsertSeason {
    UpsertSeason {
        tmdb_id: season.id,
        media_item_id,
        season_number: season.season_number,
        name: season.name.clone(),
        overview: season.overview.clone(),
        poster_path: season.poster_path.clone(),
        air_date: season.air_date.clone().filter(|d| !d.is_empty()),
        episode_count: season
            .episode_count
            .or_else(|| season.episodes.as_ref().map(|e| e.len() as i64)),
        vote_average: Some(scale_rating(season.vote_average).unwrap_or(0)),
    }
}

pub async fn upsert_season(db: &Database, season: &TmdbSeason, media_item_id: i64) -> Result<i64> {
    db.seasons().upsert(&season_input(season, media_item_id)).await
}

pub async fn upsert_seasons(db: &Database, seasons: &[TmdbSeason], media_item_id: i64) -> Result<usize> {
    if seasons.is_empty() {
        return Ok(0);
    }
    let inputs: Vec<UpsertSeason> = seasons.iter().map(|s| season_input(s, media_item_id)).collect();
    db.seasons().upsert_batch(&inputs).await
}

pub fn episode_input(episode: &TmdbEpisode, season_id: i64) -> UpsertEpisode {
    UpsertEpisode {
        tmdb_id: episode.id,
        season_id,
        episode_number: episode.episode_number,
        name: episode.name.clone(),
        overview: episode.overview.clone(),
        still_path: episode.still_path.clone(),
        air_date: episode.air_date.clone().filter(|d| !d.is_empty()),
        vote_average: Some(scale_rating(episode.vote_average).unwrap_or(0)),
        vote_count: episode.vote_count,
    }
}

pub async fn upsert_episodes(db: &Database, episodes: &[TmdbEpisode], season_id: i64) -> Result<usize> {
    if episodes.is_empty() {
        return Ok(0);
    }
    let inputs: Vec<UpsertEpisode> = episodes.iter().map(|e| episode_input(e, season_id)).collect();
    db.episodes().upsert_batch(&inputs).await
}

/// Upsert a season together with whatever episodes the payload carries
pub async fn upsert_season_with_episodes(db: &Database, season: &TmdbSeason, media_item_id: i64) -> Result<i64> {
    let season_id = upsert_season(db, season, media_item_id).await?;
    if let Some(ref episodes) = season.episodes {
        upsert_episodes(db, episodes, season_id).await?;
    }
    Ok(season_id)
}

/// Local id for a movie/show, fetching it from the catalog when missing.
///
/// Shows are stored with their season list. Lookup failures are logged and
/// reported as `None`.
pub async fn ensure_media_item(
    db: &Database,
    catalog: &dyn ShowCatalog,
    tmdb_id: i64,
    media_type: MediaType,
) -> Option<i64> {
    match db.media_items().find_by_tmdb(tmdb_id, media_type).await {
        Ok(Some(item)) => return Some(item.id),
        Ok(None) => {}
        Err(e) => {
            warn!(tmdb_id, media_type = %media_type, error = %e, "Media item lookup failed");
            return None;
        }
    }

    let fetched = match media_type {
        MediaType::Movie => catalog.movie(tmdb_id).await,
        MediaType::Tv => catalog.tv(tmdb_id).await,
        other => {
            warn!(tmdb_id, media_type = %other, "Not a catalog screen type");
            return None;
        }
    };

    let details = match fetched {
        Ok(details) => details,
        Err(e) => {
            warn!(tmdb_id, media_type = %media_type, error = %e, "Failed to fetch media item from catalog");
            return None;
        }
    };

    let media_item_id = match upsert_media_item(db, &details, media_type).await {
        Ok(id) => id,
        Err(e) => {
            warn!(tmdb_id, error = %e, "Failed to store media item");
            return None;
        }
    };

    if let Some(ref seasons) = details.seasons
        && let Err(e) = upsert_seasons(db, seasons, media_item_id).await
    {
        warn!(tmdb_id, error = %e, "Failed to store season list");
    }

    debug!(tmdb_id, media_item_id, "Media item fetched into catalog");
    Some(media_item_id)
}

pub fn book_input(item: &GoogleBookItem) -> Result<UpsertBook, CatalogError> {
    if item.id.trim().is_empty() {
        return Err(CatalogError::MissingIdentifier("book"));
    }

    let info = &item.volume_info;
    let thumbnail = info
        .image_links
        .as_ref()
        .and_then(|links| links.thumbnail.clone().or_else(|| links.small_thumbnail.clone()));

    Ok(UpsertBook {
        google_id: item.id.clone(),
        title: info
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string()),
        authors: info.authors.clone().unwrap_or_default(),
        description: Some(info.description.clone().unwrap_or_default()),
        thumbnail,
        published_date: info.published_date.clone(),
        page_count: info.page_count.filter(|p| *p > 0),
        categories: info.categories.clone().unwrap_or_default(),
        average_rating: scale_rating(info.average_rating),
        ratings_count: Some(info.ratings_count.unwrap_or(0)),
        is_ebook: item.sale_info.as_ref().and_then(|s| s.is_ebook).unwrap_or(false),
    })
}

/// Insert or update a book keyed by its Google volume id
pub async fn upsert_book(db: &Database, item: &GoogleBookItem) -> Result<i64> {
    let input = book_input(item)?;
    db.books().upsert(&input).await
}

pub fn itunes_podcast_input(item: &ItunesPodcast) -> Result<UpsertPodcast, CatalogError> {
    let itunes_id = item
        .collection_id
        .ok_or(CatalogError::MissingIdentifier("podcast"))?;

    Ok(UpsertPodcast {
        itunes_id: Some(itunes_id.to_string()),
        collection_name: item
            .collection_name
            .clone()
            .unwrap_or_else(|| "Unknown Podcast".to_string()),
        artist_name: item
            .artist_name
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string()),
        feed_url: item.feed_url.clone(),
        artwork_url: item.artwork_url600.clone().or_else(|| item.artwork_url100.clone()),
        genres: item.genres.clone().unwrap_or_default(),
        ..Default::default()
    })
}

/// Insert or update a podcast keyed by its iTunes collection id
pub async fn upsert_podcast(db: &Database, item: &ItunesPodcast) -> Result<i64> {
    let input = itunes_podcast_input(item)?;
    db.podcasts().upsert(&input).await
}

pub fn listen_notes_podcast_input(item: &ListenNotesPodcast) -> Result<UpsertPodcast, CatalogError> {
    if item.id.trim().is_empty() {
        return Err(CatalogError::MissingIdentifier("podcast"));
    }

    Ok(UpsertPodcast {
        itunes_id: item.itunes_id.map(|id| id.to_string()),
        listen_notes_id: Some(item.id.clone()),
        collection_name: item
            .display_title()
            .unwrap_or_else(|| "Unknown Podcast".to_string()),
        artist_name: item
            .display_publisher()
            .unwrap_or_else(|| "Unknown Artist".to_string()),
        artwork_url: item.image.clone().or_else(|| item.thumbnail.clone()),
        feed_url: item.rss.clone(),
        description: item.display_description(),
        total_episodes: item.total_episodes,
        listen_score: item.listen_score,
        genres: item
            .genre_ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default(),
    })
}

/// Insert or update a podcast keyed by its ListenNotes id, storing any
/// episodes embedded in the payload
pub async fn upsert_podcast_from_listen_notes(db: &Database, item: &ListenNotesPodcast) -> Result<i64> {
    let input = listen_notes_podcast_input(item)?;
    let podcast_id = db.podcasts().upsert(&input).await?;

    if let Some(ref episodes) = item.episodes {
        for episode in episodes {
            let pub_date = episode
                .pub_date_ms
                .and_then(chrono::DateTime::from_timestamp_millis)
                .map(|d| d.to_rfc3339());

            let result = db
                .podcasts()
                .upsert_episode(&UpsertPodcastEpisode {
                    podcast_id,
                    guid: episode.id.clone(),
                    title: episode.title.clone().unwrap_or_else(|| "Untitled".to_string()),
                    description: episode.description.clone(),
                    pub_date,
                    audio_url: episode.audio.clone(),
                    duration_seconds: episode.audio_length_sec,
                })
                .await;

            if let Err(e) = result {
                warn!(podcast_id, guid = %episode.id, error = %e, "Failed to store podcast episode");
            }
        }
    }

    Ok(podcast_id)
}

/// Store a parsed feed's episodes and stamp the podcast as refreshed.
/// Returns the number of episodes written.
pub async fn apply_feed(db: &Database, podcast_id: i64, feed: &ParsedFeed) -> Result<usize> {
    let podcasts = db.podcasts();
    let mut written = 0;

    for episode in &feed.episodes {
        let result = podcasts
            .upsert_episode(&UpsertPodcastEpisode {
                podcast_id,
                guid: episode.guid.clone(),
                title: episode.title.clone(),
                description: episode.description.clone(),
                pub_date: episode.pub_date.clone(),
                audio_url: episode.audio_url.clone(),
                duration_seconds: episode.duration_seconds,
            })
            .await;

        match result {
            Ok(_) => written += 1,
            Err(e) => warn!(podcast_id, guid = %episode.guid, error = %e, "Failed to store feed episode"),
        }
    }

    podcasts
        .mark_refreshed(podcast_id, feed.description.as_deref())
        .await?;

    Ok(written)
}

/// Fetch the podcast's RSS feed and store its episodes.
///
/// No-op (returns 0) when the podcast has no feed URL.
pub async fn refresh_podcast_episodes(
    db: &Database,
    feed_client: &PodcastFeedClient,
    podcast_id: i64,
) -> Result<usize> {
    let Some(podcast) = db.podcasts().get_by_id(podcast_id).await? else {
        anyhow::bail!("Podcast {} not found", podcast_id);
    };

    let Some(feed_url) = podcast.feed_url.filter(|u| !u.trim().is_empty()) else {
        debug!(podcast_id, "Podcast has no feed URL, skipping refresh");
        return Ok(0);
    };

    let feed = feed_client.fetch_feed(&feed_url).await?;
    let written = apply_feed(db, podcast_id, &feed).await?;

    info!(podcast_id, episodes = written, "Refreshed podcast episodes");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::google_books::{GoogleBookImageLinks, GoogleBookVolumeInfo};
    use crate::services::podcast_feed::FeedEpisode;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_media_item_input_fallbacks() {
        let item = TmdbMediaDetails {
            id: 1399,
            name: Some("Game of Thrones".to_string()),
            original_name: Some("Game of Thrones".to_string()),
            first_air_date: Some("2011-04-17".to_string()),
            vote_average: Some(8.44),
            ..Default::default()
        };

        let input = media_item_input(&item, MediaType::Tv);
        assert_eq!(input.title, "Game of Thrones");
        assert_eq!(input.release_date.as_deref(), Some("2011-04-17"));
        assert_eq!(input.vote_average, Some(84));
    }

    #[test]
    fn test_zero_vote_average_is_absent() {
        let item = TmdbMediaDetails {
            id: 1,
            vote_average: Some(0.0),
            ..Default::default()
        };
        assert_eq!(media_item_input(&item, MediaType::Movie).vote_average, None);
    }

    #[test]
    fn test_book_input_requires_id() {
        let item = GoogleBookItem::default();
        assert_matches!(book_input(&item), Err(CatalogError::MissingIdentifier("book")));
    }

    #[test]
    fn test_book_input_mapping() {
        let item = GoogleBookItem {
            id: "abc".to_string(),
            volume_info: GoogleBookVolumeInfo {
                image_links: Some(GoogleBookImageLinks {
                    small_thumbnail: Some("small.jpg".to_string()),
                    thumbnail: None,
                }),
                average_rating: Some(4.5),
                ..Default::default()
            },
            sale_info: None,
        };

        let input = book_input(&item).unwrap();
        assert_eq!(input.title, "Unknown Title");
        assert_eq!(input.thumbnail.as_deref(), Some("small.jpg"));
        assert_eq!(input.average_rating, Some(45));
        assert!(!input.is_ebook);
    }

    #[test]
    fn test_itunes_podcast_defaults() {
        let item = ItunesPodcast {
            collection_id: Some(42),
            artwork_url100: Some("100.jpg".to_string()),
            ..Default::default()
        };

        let input = itunes_podcast_input(&item).unwrap();
        assert_eq!(input.itunes_id.as_deref(), Some("42"));
        assert_eq!(input.collection_name, "Unknown Podcast");
        assert_eq!(input.artist_name, "Unknown Artist");
        assert_eq!(input.artwork_url.as_deref(), Some("100.jpg"));
        assert_matches!(
            itunes_podcast_input(&ItunesPodcast::default()),
            Err(CatalogError::MissingIdentifier(_))
        );
    }

    #[tokio::test]
    async fn test_upsert_media_item_latest_write_wins() {
        let db = Database::connect_in_memory().await.unwrap();

        let mut item = TmdbMediaDetails {
            id: 603,
            title: Some("The Matrix".to_string()),
            overview: Some("old".to_string()),
            ..Default::default()
        };
        let first = upsert_media_item(&db, &item, MediaType::Movie).await.unwrap();

        item.overview = Some("new".to_string());
        item.vote_average = Some(8.2);
        let second = upsert_media_item(&db, &item, MediaType::Movie).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(db.media_items().count().await.unwrap(), 1);

        let stored = db.media_items().get_by_id(first).await.unwrap().unwrap();
        assert_eq!(stored.overview.as_deref(), Some("new"));
        assert_eq!(stored.vote_average, Some(82));
    }

    #[tokio::test]
    async fn test_upsert_book_twice_keeps_identity() {
        let db = Database::connect_in_memory().await.unwrap();

        let mut item = GoogleBookItem {
            id: "vol-1".to_string(),
            volume_info: GoogleBookVolumeInfo {
                title: Some("Dune".to_string()),
                ..Default::default()
            },
            sale_info: None,
        };
        let first = upsert_book(&db, &item).await.unwrap();
        item.volume_info.title = Some("Dune (Deluxe)".to_string());
        let second = upsert_book(&db, &item).await.unwrap();

        assert_eq!(first, second);
        let stored = db.books().get_by_google_id("vol-1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Dune (Deluxe)");
    }

    #[tokio::test]
    async fn test_apply_feed_upserts_by_guid() {
        let db = Database::connect_in_memory().await.unwrap();
        let podcast_id = upsert_podcast(
            &db,
            &ItunesPodcast {
                collection_id: Some(7),
                collection_name: Some("Show".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let episode = FeedEpisode {
            guid: "g1".to_string(),
            title: "First".to_string(),
            description: None,
            pub_date: Some("2024-01-01T00:00:00+00:00".to_string()),
            audio_url: None,
            duration_seconds: Some(60),
        };
        let mut feed = ParsedFeed {
            description: Some("About".to_string()),
            episodes: vec![episode.clone()],
        };

        assert_eq!(apply_feed(&db, podcast_id, &feed).await.unwrap(), 1);

        feed.episodes[0].title = "First (edited)".to_string();
        apply_feed(&db, podcast_id, &feed).await.unwrap();

        let episodes = db.podcasts().list_episodes(podcast_id, 100).await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "First (edited)");

        let podcast = db.podcasts().get_by_id(podcast_id).await.unwrap().unwrap();
        assert_eq!(podcast.description.as_deref(), Some("About"));
        assert!(podcast.last_refreshed_at.is_some());
    }
}
