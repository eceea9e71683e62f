//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Default Trakt OAuth callback, matching the route served by this backend
const DEFAULT_TRAKT_REDIRECT_URI: &str = "http://localhost:3001/api/auth/trakt/callback";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// SQLite path, or a `sqlite:` URL
    pub database_url: String,

    /// JWT secret for signing and verifying access tokens
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,

    pub tmdb_api_key: Option<String>,

    pub trakt_client_id: Option<String>,
    pub trakt_client_secret: Option<String>,
    pub trakt_redirect_uri: String,

    /// Optional; Google Books works without a key at a lower quota
    pub google_books_api_key: Option<String>,

    pub listen_notes_api_key: Option<String>,

    /// Base64 AES-256 key for OAuth tokens at rest. Tokens are stored in
    /// plaintext when unset.
    pub token_encryption_key: Option<String>,

    /// `json` (default) or `pretty`
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/traktdb.db".to_string());

        // In production this should be set explicitly
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using an ephemeral development secret");
            format!("dev-secret-{}", uuid::Uuid::new_v4())
        });

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            jwt_secret: jwt_secret.trim().to_string(),

            access_token_lifetime: env::var("ACCESS_TOKEN_LIFETIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7 * 24 * 60 * 60),

            tmdb_api_key: non_empty("TMDB_API_KEY"),

            trakt_client_id: non_empty("TRAKT_CLIENT_ID"),
            trakt_client_secret: non_empty("TRAKT_CLIENT_SECRET"),
            trakt_redirect_uri: env::var("TRAKT_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_TRAKT_REDIRECT_URI.to_string()),

            google_books_api_key: non_empty("GOOGLE_BOOKS_API_KEY"),

            listen_notes_api_key: non_empty("LISTEN_NOTES_API_KEY"),

            token_encryption_key: non_empty("TOKEN_ENCRYPTION_KEY"),

            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        })
    }

    /// Whether both halves of the Trakt OAuth app are configured
    pub fn trakt_enabled(&self) -> bool {
        self.trakt_client_id.is_some() && self.trakt_client_secret.is_some()
    }

    /// Configuration suitable for tests: no external keys, fixed secret
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            access_token_lifetime: 3600,
            tmdb_api_key: None,
            trakt_client_id: None,
            trakt_client_secret: None,
            trakt_redirect_uri: DEFAULT_TRAKT_REDIRECT_URI.to_string(),
            google_books_api_key: None,
            listen_notes_api_key: None,
            token_encryption_key: None,
            log_format: "pretty".to_string(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
