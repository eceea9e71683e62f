//! Provider clients and domain services

pub mod auth;
pub mod catalog;
pub mod encryption;
pub mod google_books;
pub mod itunes;
pub mod library;
pub mod listen_notes;
pub mod podcast_feed;
pub mod rate_limiter;
pub mod tmdb;
pub mod trakt;
pub mod trakt_push;
pub mod trakt_sync;

pub use auth::{AuthConfig, AuthError, AuthService, AuthenticatedUser};
pub use catalog::{CatalogError, ShowCatalog};
pub use encryption::TokenCipher;
pub use google_books::GoogleBooksClient;
pub use itunes::ItunesClient;
pub use library::LibraryError;
pub use listen_notes::ListenNotesClient;
pub use podcast_feed::PodcastFeedClient;
pub use rate_limiter::UpstreamError;
pub use tmdb::TmdbClient;
pub use trakt::{TraktApi, TraktClient};
pub use trakt_push::{TraktPush, TraktPusher};
pub use trakt_sync::{SyncError, SyncReport, TraktSyncService};
