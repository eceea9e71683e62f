//! Application state and HTTP router construction.
//!
//! Used by [main](crate) and by the integration tests to build the Axum app.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::services::{
    AuthConfig, AuthService, GoogleBooksClient, ItunesClient, ListenNotesClient, PodcastFeedClient,
    ShowCatalog, TmdbClient, TokenCipher, TraktApi, TraktClient, TraktPusher, TraktSyncService,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub auth: Arc<AuthService>,
    pub tmdb: Arc<TmdbClient>,
    /// Movie/TV lookups used by library writes; TMDB unless swapped out
    pub catalog: Arc<dyn ShowCatalog>,
    /// OAuth application (connect, callback, revoke)
    pub trakt: Arc<TraktClient>,
    /// User-scoped Trakt reads and writes; the same client unless swapped out
    pub trakt_api: Arc<dyn TraktApi>,
    pub google_books: Arc<GoogleBooksClient>,
    pub itunes: Arc<ItunesClient>,
    pub listen_notes: Option<Arc<ListenNotesClient>>,
    pub feed: Arc<PodcastFeedClient>,
    pub cipher: TokenCipher,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let auth = Arc::new(AuthService::new(db.clone(), AuthConfig::from_config(&config)));
        let tmdb = Arc::new(TmdbClient::new(config.tmdb_api_key.clone().unwrap_or_default()));
        let trakt = Arc::new(TraktClient::new(
            config.trakt_client_id.clone(),
            config.trakt_client_secret.clone(),
            config.trakt_redirect_uri.clone(),
        ));
        let cipher = TokenCipher::from_config(config.token_encryption_key.as_deref())?;

        if !cipher.is_enabled() {
            tracing::warn!("TOKEN_ENCRYPTION_KEY not set, Trakt tokens will be stored unencrypted");
        }

        Ok(Self {
            google_books: Arc::new(GoogleBooksClient::new(config.google_books_api_key.clone())),
            itunes: Arc::new(ItunesClient::new()),
            listen_notes: config
                .listen_notes_api_key
                .clone()
                .map(|key| Arc::new(ListenNotesClient::new(key))),
            feed: Arc::new(PodcastFeedClient::new()),
            catalog: tmdb.clone(),
            trakt_api: trakt.clone(),
            config: Arc::new(config),
            db,
            auth,
            tmdb,
            trakt,
            cipher,
        })
    }

    /// Replace the movie/TV catalog (tests use an in-memory fake)
    pub fn with_catalog(mut self, catalog: Arc<dyn ShowCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the user-scoped Trakt API (tests use an in-memory fake)
    pub fn with_trakt_api(mut self, trakt_api: Arc<dyn TraktApi>) -> Self {
        self.trakt_api = trakt_api;
        self
    }

    pub fn sync_service(&self) -> TraktSyncService {
        TraktSyncService::new(
            self.db.clone(),
            self.trakt_api.clone(),
            self.catalog.clone(),
            self.cipher.clone(),
        )
    }

    pub fn pusher(&self) -> TraktPusher {
        TraktPusher::new(self.db.clone(), self.trakt_api.clone(), self.cipher.clone())
    }
}

/// Build the full Axum router: /api, health checks and layers.
/// Returns Router<()> (state fully applied) for use with axum::serve.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(crate::api::health::router())
        .nest("/api", crate::api::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
