//! Local → Trakt pushes
//!
//! Status changes made through the API are mirrored to Trakt when the user
//! has a connection. Pushes run in a spawned task so the request never waits
//! on Trakt, and a failed push is only logged.

use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{Database, MediaType, TRAKT_PROVIDER, WatchStatus};

use super::encryption::TokenCipher;
use super::trakt::{PushAction, TraktApi, TraktSyncEntry, TraktSyncPayload};

/// One change to mirror
#[derive(Debug, Clone)]
pub enum TraktPush {
    History { payload: TraktSyncPayload, action: PushAction },
    Watchlist { payload: TraktSyncPayload, action: PushAction },
}

impl TraktPush {
    /// Push for a movie/show status change. Only `completed` and
    /// `plan_to_watch` have a Trakt counterpart.
    pub fn for_media_status(tmdb_id: i64, media_type: MediaType, status: WatchStatus) -> Option<Self> {
        let watched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut payload = TraktSyncPayload::default();
        let entries = match media_type {
            MediaType::Movie => &mut payload.movies,
            MediaType::Tv => &mut payload.shows,
            _ => return None,
        };

        match status {
            WatchStatus::Completed => {
                entries.push(TraktSyncEntry::tmdb(tmdb_id, Some(watched_at)));
                Some(TraktPush::History {
                    payload,
                    action: PushAction::Add,
                })
            }
            WatchStatus::PlanToWatch => {
                entries.push(TraktSyncEntry::tmdb(tmdb_id, None));
                Some(TraktPush::Watchlist {
                    payload,
                    action: PushAction::Add,
                })
            }
            WatchStatus::Watching | WatchStatus::Dropped => None,
        }
    }

    /// Push for an episode watched toggle, addressed by the episode's TMDB id
    pub fn for_episode(episode_tmdb_id: i64, watched: bool) -> Self {
        let (watched_at, action) = if watched {
            (
                Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                PushAction::Add,
            )
        } else {
            (None, PushAction::Remove)
        };

        TraktPush::History {
            payload: TraktSyncPayload {
                episodes: vec![TraktSyncEntry::tmdb(episode_tmdb_id, watched_at)],
                ..Default::default()
            },
            action,
        }
    }
}

#[derive(Clone)]
pub struct TraktPusher {
    db: Database,
    trakt: Arc<dyn TraktApi>,
    cipher: TokenCipher,
}

impl TraktPusher {
    pub fn new(db: Database, trakt: Arc<dyn TraktApi>, cipher: TokenCipher) -> Self {
        Self { db, trakt, cipher }
    }

    /// Send a push now. Returns `false` when the user has no Trakt connection.
    pub async fn push(&self, user_id: Uuid, push: &TraktPush) -> Result<bool> {
        let Some(connection) = self.db.connections().get(user_id, TRAKT_PROVIDER).await? else {
            return Ok(false);
        };
        let token = self.cipher.open(&connection.access_token)?;

        match push {
            TraktPush::History { payload, action } => {
                self.trakt.push_history(&token, payload, *action).await?
            }
            TraktPush::Watchlist { payload, action } => {
                self.trakt.push_watchlist(&token, payload, *action).await?
            }
        }

        debug!(user_id = %user_id, "Pushed change to Trakt");
        Ok(true)
    }

    /// Fire-and-forget [`Self::push`]
    pub fn spawn(&self, user_id: Uuid, push: TraktPush) {
        let pusher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pusher.push(user_id, &push).await {
                warn!(user_id = %user_id, error = %e, "Failed to push change to Trakt");
            }
        });
    }
}
