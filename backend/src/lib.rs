//! traktdb backend: personal media library with Trakt.tv reconciliation
//!
//! Movies and shows come from TMDB, books from Google Books and podcasts from
//! iTunes / Listen Notes. Everything is mirrored into SQLite and exposed as a
//! REST API under `/api`.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod services;

pub use app::{AppState, build_app};
