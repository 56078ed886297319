//! Database schema and record types

use crate::movie::MovieId;
use crate::session::ChatId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS history (
    chat_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    request TEXT NOT NULL,

    PRIMARY KEY (chat_id, created_at)
);

CREATE TABLE IF NOT EXISTS stats (
    chat_id INTEGER NOT NULL,
    film_id INTEGER NOT NULL,
    film_name TEXT NOT NULL,
    count INTEGER NOT NULL,

    PRIMARY KEY (chat_id, film_id)
);

CREATE INDEX IF NOT EXISTS idx_stats_count ON stats(chat_id, count DESC);
";

/// One search query, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub chat_id: ChatId,
    pub created_at: DateTime<Utc>,
    pub request: String,
}

/// How many times a movie was shown in a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCount {
    pub chat_id: ChatId,
    pub movie_id: MovieId,
    /// Title as of the latest view
    pub title: String,
    pub count: u64,
}

/// Fixed-width RFC 3339 with nanoseconds, so text order is time order
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| DateTime::<Utc>::MIN_UTC, |dt| dt.with_timezone(&Utc))
}
