//! REST API served under `/api`
//!
//! Health checks are mounted at the root by [`crate::app::build_app`].

pub mod auth;
pub mod books;
pub mod calendar;
pub mod error;
pub mod friends;
pub mod health;
pub mod library;
pub mod media;
pub mod podcasts;
pub mod profile;
pub mod search;
pub mod trakt;

use axum::Router;

use crate::AppState;

pub use error::{ApiError, ApiResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(trakt::router())
        .merge(library::router())
        .merge(books::router())
        .merge(podcasts::router())
        .merge(media::router())
        .merge(calendar::router())
        .merge(friends::router())
        .merge(profile::router())
        .merge(search::router())
}
