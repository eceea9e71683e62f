//! traktdb server entry point

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traktdb::config::Config;
use traktdb::db::Database;
use traktdb::{AppState, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "traktdb=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }

    tracing::info!("Starting traktdb backend");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!(database = %config.database_url, "Database ready");

    if !config.trakt_enabled() {
        tracing::warn!("TRAKT_CLIENT_ID / TRAKT_CLIENT_SECRET not set, Trakt features disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;

    let state = AppState::new(config, db)?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
