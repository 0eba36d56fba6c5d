//! Timestamp formatting shared with the storage layer.
//!
//! The database stores timestamps as `YYYY-MM-DD HH:MM:SS.ffffff+00:00`
//! text. Keeping the space separator (rather than RFC 3339's `T`) makes
//! the stored values lexicographically comparable with SQLite's
//! `datetime('now', ...)` output, which the archival UPDATE relies on.

use chrono::{DateTime, NaiveDateTime, Utc};

const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f+00:00";

pub fn to_db(dt: DateTime<Utc>) -> String {
    dt.format(DB_FORMAT).to_string()
}

/// Parse a stored timestamp, tolerating both our canonical format and
/// plain `CURRENT_TIMESTAMP` / RFC 3339 values.
pub fn from_db(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [DB_FORMAT, "%Y-%m-%d %H:%M:%S%.f+00:00"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
