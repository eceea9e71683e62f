//! Upcoming releases from the user's Trakt calendars

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::db::TRAKT_PROVIDER;
use crate::services::trakt::{TraktCalendarMovie, TraktCalendarShow};

/// Days covered from today
pub const CALENDAR_DAYS: u32 = 30;
const CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEpisode {
    pub id: String,
    pub trakt_episode_id: Option<i64>,
    pub trakt_show_id: Option<i64>,
    pub show_title: Option<String>,
    pub season_number: i64,
    pub episode_number: i64,
    pub episode_title: Option<String>,
    pub release_date: String,
    pub tmdb_show_id: Option<i64>,
    pub tmdb_episode_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMovie {
    pub id: String,
    pub trakt_movie_id: Option<i64>,
    pub movie_title: Option<String>,
    pub release_date: String,
    pub release_type: &'static str,
    pub tmdb_movie_id: Option<i64>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: String,
    pub episodes: Vec<CalendarEpisode>,
    pub movies: Vec<CalendarMovie>,
}

/// `first_aired` is a full timestamp; only its date part groups
fn date_part(timestamp: &str) -> String {
    timestamp.split('T').next().unwrap_or(timestamp).to_string()
}

fn episode_entry(item: &TraktCalendarShow) -> CalendarEpisode {
    let show_trakt = item.show.ids.trakt;
    CalendarEpisode {
        id: format!(
            "{}-{}-{}",
            show_trakt.map(|id| id.to_string()).unwrap_or_default(),
            item.episode.season,
            item.episode.number
        ),
        trakt_episode_id: item.episode.ids.trakt,
        trakt_show_id: show_trakt,
        show_title: item.show.title.clone(),
        season_number: item.episode.season,
        episode_number: item.episode.number,
        episode_title: item.episode.title.clone(),
        release_date: date_part(&item.first_aired),
        tmdb_show_id: item.show.ids.tmdb,
        tmdb_episode_id: item.episode.ids.tmdb,
    }
}

fn movie_entry(item: &TraktCalendarMovie) -> CalendarMovie {
    CalendarMovie {
        id: item.movie.ids.trakt.map(|id| id.to_string()).unwrap_or_default(),
        trakt_movie_id: item.movie.ids.trakt,
        movie_title: item.movie.title.clone(),
        release_date: item.released.clone(),
        release_type: "theatrical",
        tmdb_movie_id: item.movie.ids.tmdb,
    }
}

/// Bucket both calendars by release date, earliest first
pub fn group_by_day(shows: &[TraktCalendarShow], movies: &[TraktCalendarMovie]) -> Vec<CalendarDay> {
    let mut days: BTreeMap<String, CalendarDay> = BTreeMap::new();

    for episode in shows.iter().map(episode_entry) {
        days.entry(episode.release_date.clone())
            .or_insert_with_key(|date| CalendarDay {
                date: date.clone(),
                ..Default::default()
            })
            .episodes
            .push(episode);
    }

    for movie in movies.iter().map(movie_entry) {
        days.entry(movie.release_date.clone())
            .or_insert_with_key(|date| CalendarDay {
                date: date.clone(),
                ..Default::default()
            })
            .movies
            .push(movie);
    }

    days.into_values().collect()
}

async fn upcoming(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    let connection = state
        .db
        .connections()
        .get(user.id, TRAKT_PROVIDER)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Trakt not connected".to_string()))?;
    let token = state.cipher.open(&connection.access_token)?;

    let start: NaiveDate = Utc::now().date_naive();
    let end = start + Duration::days(CALENDAR_DAYS as i64);
    let start_date = start.format("%Y-%m-%d").to_string();

    let (shows, movies) = tokio::try_join!(
        state.trakt_api.calendar_shows(&token, &start_date, CALENDAR_DAYS),
        state.trakt_api.calendar_movies(&token, &start_date, CALENDAR_DAYS),
    )?;

    let body = json!({
        "success": true,
        "data": {
            "startDate": start_date,
            "endDate": end.format("%Y-%m-%d").to_string(),
            "fetchedAt": Utc::now().to_rfc3339(),
            "days": group_by_day(&shows, &movies),
        }
    });

    Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(body)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/calendar/upcoming", get(upcoming))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::trakt::{TraktEpisode, TraktIds, TraktMedia};

    fn ids(trakt: i64, tmdb: i64) -> TraktIds {
        TraktIds {
            trakt: Some(trakt),
            tmdb: Some(tmdb),
            ..Default::default()
        }
    }

    fn show(first_aired: &str, season: i64, number: i64) -> TraktCalendarShow {
        TraktCalendarShow {
            first_aired: first_aired.to_string(),
            episode: TraktEpisode {
                season,
                number,
                title: Some(format!("Episode {}", number)),
                ids: ids(900 + number, 800 + number),
            },
            show: TraktMedia {
                title: Some("Severance".to_string()),
                year: Some(2022),
                ids: ids(42, 95396),
            },
        }
    }

    fn movie(released: &str) -> TraktCalendarMovie {
        TraktCalendarMovie {
            released: released.to_string(),
            movie: TraktMedia {
                title: Some("Dune".to_string()),
                year: Some(2024),
                ids: ids(7, 693134),
            },
        }
    }

    #[test]
    fn test_groups_by_date_ascending() {
        let days = group_by_day(
            &[
                show("2024-03-08T02:00:00.000Z", 2, 8),
                show("2024-03-01T02:00:00.000Z", 2, 7),
            ],
            &[movie("2024-03-01")],
        );

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2024-03-01");
        assert_eq!(days[0].episodes.len(), 1);
        assert_eq!(days[0].movies.len(), 1);
        assert_eq!(days[1].date, "2024-03-08");
        assert!(days[1].movies.is_empty());
    }

    #[test]
    fn test_episode_entry_shape() {
        let entry = episode_entry(&show("2024-03-01T02:00:00.000Z", 2, 7));
        assert_eq!(entry.id, "42-2-7");
        assert_eq!(entry.release_date, "2024-03-01");
        assert_eq!(entry.tmdb_show_id, Some(95396));
        assert_eq!(entry.trakt_episode_id, Some(907));

        let value = serde_json::to_value(movie_entry(&movie("2024-03-01"))).unwrap();
        assert_eq!(value["releaseType"], "theatrical");
        assert_eq!(value["tmdbMovieId"], 693134);
    }
}
