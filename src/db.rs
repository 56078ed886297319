//! Database module for the bot
//!
//! Provides persistence for query history and per-chat view counters.

mod schema;

pub use schema::*;

use crate::movie::MovieId;
use crate::session::ChatId;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// How long a write waits for another connection holding the file lock
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== History Operations ====================

    /// Record a search query.
    ///
    /// `(chat_id, created_at)` is the key, so a timestamp that is not strictly
    /// after the chat's newest row is moved to one nanosecond past it. The
    /// stored record is returned.
    pub fn append_history(
        &self,
        chat_id: ChatId,
        at: DateTime<Utc>,
        request: &str,
    ) -> DbResult<HistoryRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let newest: Option<String> = tx.query_row(
            "SELECT MAX(created_at) FROM history WHERE chat_id = ?1",
            params![chat_id.0],
            |row| row.get(0),
        )?;

        let created_at = match newest.as_deref().map(parse_timestamp) {
            Some(newest) if at <= newest => newest + Duration::nanoseconds(1),
            _ => at,
        };

        tx.execute(
            "INSERT INTO history (chat_id, created_at, request) VALUES (?1, ?2, ?3)",
            params![chat_id.0, format_timestamp(&created_at), request],
        )?;
        tx.commit()?;

        Ok(HistoryRecord {
            chat_id,
            created_at,
            request: request.to_string(),
        })
    }

    /// Past queries of a chat, newest first
    pub fn list_history(&self, chat_id: ChatId) -> DbResult<Vec<HistoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT chat_id, created_at, request FROM history
             WHERE chat_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![chat_id.0], |row| {
            Ok(HistoryRecord {
                chat_id: ChatId(row.get(0)?),
                created_at: parse_timestamp(&row.get::<_, String>(1)?),
                request: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Stats Operations ====================

    /// Count one view of a movie in a chat and refresh its stored title.
    ///
    /// A single upsert statement in an immediate transaction, so concurrent
    /// callers (even on other connections to the same file) never lose an
    /// increment.
    pub fn upsert_view_count(
        &self,
        chat_id: ChatId,
        movie_id: MovieId,
        title: &str,
    ) -> DbResult<ViewCount> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let count: i64 = tx.query_row(
            "INSERT INTO stats (chat_id, film_id, film_name, count) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(chat_id, film_id) DO UPDATE SET
                 count = count + 1,
                 film_name = excluded.film_name
             RETURNING count",
            params![chat_id.0, movie_id.0, title],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(ViewCount {
            chat_id,
            movie_id,
            title: title.to_string(),
            count: u64::try_from(count).unwrap_or_default(),
        })
    }

    /// View counters of a chat, most viewed first, ties by movie id
    pub fn list_stats(&self, chat_id: ChatId) -> DbResult<Vec<ViewCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT chat_id, film_id, film_name, count FROM stats
             WHERE chat_id = ?1 ORDER BY count DESC, film_id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.0], |row| {
            Ok(ViewCount {
                chat_id: ChatId(row.get(0)?),
                movie_id: MovieId(row.get(1)?),
                title: row.get(2)?,
                count: u64::try_from(row.get::<_, i64>(3)?).unwrap_or_default(),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}
