//! SQLite helper utilities for type conversion
//!
//! SQLite has no native UUID, array or boolean types. User ids are stored as
//! TEXT, string arrays as JSON TEXT, timestamps as RFC 3339 TEXT and flags as
//! 0/1 integers.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

// ============================================================================
// UUID Helpers
// ============================================================================

/// Convert a UUID to a SQLite-compatible string
#[inline]
pub fn uuid_to_str(id: Uuid) -> String {
    id.to_string()
}

/// Parse a SQLite string back to a UUID
#[inline]
pub fn str_to_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow!("Invalid UUID '{}': {}", s, e))
}

// ============================================================================
// Array Helpers (stored as JSON strings)
// ============================================================================

/// Serialize a slice to a JSON array string
#[inline]
pub fn vec_to_json<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON array string, yielding an empty vec on malformed input
#[inline]
pub fn json_to_vec<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Current UTC time as RFC 3339
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an RFC 3339 string, falling back to SQLite's `datetime()` format
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Normalize an upstream timestamp for storage, defaulting to now when it
/// is missing or unparseable
pub fn normalize_timestamp(s: Option<&str>) -> String {
    s.and_then(|s| str_to_datetime(s).ok())
        .map(datetime_to_str)
        .unwrap_or_else(now_iso8601)
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

#[inline]
pub fn int_to_bool(i: i64) -> bool {
    i != 0
}

// ============================================================================
// Query Building Helpers
// ============================================================================

/// Build `?, ?, ?` for an `IN (...)` clause
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
