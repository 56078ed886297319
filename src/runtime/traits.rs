//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the chat runtime with mock implementations.

use super::Notice;
use crate::db::{DbError, HistoryRecord, ViewCount};
use crate::movie::{MovieDetails, MovieId};
use crate::providers::{ProviderError, WatchLinks};
use crate::session::{ChatId, Controls, MessageId, RenderTarget};
use crate::telegram::TelegramError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Query history and view counters
#[async_trait]
pub trait Storage: Send + Sync {
    async fn append_history(
        &self,
        chat_id: ChatId,
        at: DateTime<Utc>,
        request: &str,
    ) -> Result<HistoryRecord, DbError>;

    async fn list_history(&self, chat_id: ChatId) -> Result<Vec<HistoryRecord>, DbError>;

    async fn upsert_view_count(
        &self,
        chat_id: ChatId,
        movie_id: MovieId,
        title: &str,
    ) -> Result<ViewCount, DbError>;

    async fn list_stats(&self, chat_id: ChatId) -> Result<Vec<ViewCount>, DbError>;
}

/// Movie search and detail lookup
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Ids matching a keyword; empty when nothing matched
    async fn search(&self, keyword: &str) -> Result<Vec<MovieId>, ProviderError>;

    async fn details(&self, id: MovieId) -> Result<MovieDetails, ProviderError>;
}

/// Watch-link discovery
#[async_trait]
pub trait LinkFinder: Send + Sync {
    async fn find_watch_links(&self, details: &MovieDetails) -> Result<WatchLinks, ProviderError>;
}

/// User-visible output on the messaging platform
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Show a candidate with its controls and return the message carrying it
    async fn show_candidate(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        controls: Controls,
        target: RenderTarget,
    ) -> Result<MessageId, TelegramError>;

    async fn clear_controls(&self, chat_id: ChatId, message_id: MessageId)
        -> Result<(), TelegramError>;

    async fn restore_controls(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        controls: Controls,
    ) -> Result<(), TelegramError>;

    async fn send_watch_links(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        links: &WatchLinks,
    ) -> Result<(), TelegramError>;

    async fn send_notice(&self, chat_id: ChatId, notice: &Notice) -> Result<(), TelegramError>;

    async fn send_stats(&self, chat_id: ChatId, stats: &[ViewCount]) -> Result<(), TelegramError>;

    async fn send_history(
        &self,
        chat_id: ChatId,
        history: &[HistoryRecord],
    ) -> Result<(), TelegramError>;

    /// Acknowledge a button press so the client stops its spinner
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError>;

    async fn typing(&self, chat_id: ChatId) -> Result<(), TelegramError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn append_history(
        &self,
        chat_id: ChatId,
        at: DateTime<Utc>,
        request: &str,
    ) -> Result<HistoryRecord, DbError> {
        (**self).append_history(chat_id, at, request).await
    }

    async fn list_history(&self, chat_id: ChatId) -> Result<Vec<HistoryRecord>, DbError> {
        (**self).list_history(chat_id).await
    }

    async fn upsert_view_count(
        &self,
        chat_id: ChatId,
        movie_id: MovieId,
        title: &str,
    ) -> Result<ViewCount, DbError> {
        (**self).upsert_view_count(chat_id, movie_id, title).await
    }

    async fn list_stats(&self, chat_id: ChatId) -> Result<Vec<ViewCount>, DbError> {
        (**self).list_stats(chat_id).await
    }
}

#[async_trait]
impl<T: MovieCatalog + ?Sized> MovieCatalog for Arc<T> {
    async fn search(&self, keyword: &str) -> Result<Vec<MovieId>, ProviderError> {
        (**self).search(keyword).await
    }

    async fn details(&self, id: MovieId) -> Result<MovieDetails, ProviderError> {
        (**self).details(id).await
    }
}

#[async_trait]
impl<T: LinkFinder + ?Sized> LinkFinder for Arc<T> {
    async fn find_watch_links(&self, details: &MovieDetails) -> Result<WatchLinks, ProviderError> {
        (**self).find_watch_links(details).await
    }
}

#[async_trait]
impl<T: Renderer + ?Sized> Renderer for Arc<T> {
    async fn show_candidate(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        controls: Controls,
        target: RenderTarget,
    ) -> Result<MessageId, TelegramError> {
        (**self)
            .show_candidate(chat_id, details, controls, target)
            .await
    }

    async fn clear_controls(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TelegramError> {
        (**self).clear_controls(chat_id, message_id).await
    }

    async fn restore_controls(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        controls: Controls,
    ) -> Result<(), TelegramError> {
        (**self).restore_controls(chat_id, message_id, controls).await
    }

    async fn send_watch_links(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        links: &WatchLinks,
    ) -> Result<(), TelegramError> {
        (**self).send_watch_links(chat_id, details, links).await
    }

    async fn send_notice(&self, chat_id: ChatId, notice: &Notice) -> Result<(), TelegramError> {
        (**self).send_notice(chat_id, notice).await
    }

    async fn send_stats(&self, chat_id: ChatId, stats: &[ViewCount]) -> Result<(), TelegramError> {
        (**self).send_stats(chat_id, stats).await
    }

    async fn send_history(
        &self,
        chat_id: ChatId,
        history: &[HistoryRecord],
    ) -> Result<(), TelegramError> {
        (**self).send_history(chat_id, history).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        (**self).answer_callback(callback_id).await
    }

    async fn typing(&self, chat_id: ChatId) -> Result<(), TelegramError> {
        (**self).typing(chat_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;
use crate::providers::{GoogleLinkFinder, KinopoiskClient};
use crate::telegram::{markup, TelegramApi};
use std::sync::Arc;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn append_history(
        &self,
        chat_id: ChatId,
        at: DateTime<Utc>,
        request: &str,
    ) -> Result<HistoryRecord, DbError> {
        self.db.append_history(chat_id, at, request)
    }

    async fn list_history(&self, chat_id: ChatId) -> Result<Vec<HistoryRecord>, DbError> {
        self.db.list_history(chat_id)
    }

    async fn upsert_view_count(
        &self,
        chat_id: ChatId,
        movie_id: MovieId,
        title: &str,
    ) -> Result<ViewCount, DbError> {
        self.db.upsert_view_count(chat_id, movie_id, title)
    }

    async fn list_stats(&self, chat_id: ChatId) -> Result<Vec<ViewCount>, DbError> {
        self.db.list_stats(chat_id)
    }
}

#[async_trait]
impl MovieCatalog for KinopoiskClient {
    async fn search(&self, keyword: &str) -> Result<Vec<MovieId>, ProviderError> {
        self.search_by_keyword(keyword).await
    }

    async fn details(&self, id: MovieId) -> Result<MovieDetails, ProviderError> {
        self.fetch_details(id).await
    }
}

#[async_trait]
impl LinkFinder for GoogleLinkFinder {
    async fn find_watch_links(&self, details: &MovieDetails) -> Result<WatchLinks, ProviderError> {
        self.find(details.display_name()).await
    }
}

#[async_trait]
impl Renderer for TelegramApi {
    async fn show_candidate(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        controls: Controls,
        target: RenderTarget,
    ) -> Result<MessageId, TelegramError> {
        let poster = markup::poster_url(details);
        let caption = markup::movie_caption(details);
        let keyboard = markup::keyboard(controls);
        match target {
            RenderTarget::NewMessage => {
                self.send_photo(chat_id, &poster, &caption, Some(keyboard))
                    .await
            }
            RenderTarget::EditMessage(message_id) => {
                self.edit_message_media(chat_id, message_id, &poster, &caption, Some(keyboard))
                    .await?;
                Ok(message_id)
            }
        }
    }

    async fn clear_controls(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TelegramError> {
        self.edit_message_reply_markup(chat_id, message_id, None)
            .await
    }

    async fn restore_controls(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        controls: Controls,
    ) -> Result<(), TelegramError> {
        self.edit_message_reply_markup(chat_id, message_id, Some(markup::keyboard(controls)))
            .await
    }

    async fn send_watch_links(
        &self,
        chat_id: ChatId,
        details: &MovieDetails,
        links: &WatchLinks,
    ) -> Result<(), TelegramError> {
        self.send_message(chat_id, &markup::watch_links(details, links))
            .await
            .map(|_| ())
    }

    async fn send_notice(&self, chat_id: ChatId, notice: &Notice) -> Result<(), TelegramError> {
        self.send_message(chat_id, &markup::notice(notice))
            .await
            .map(|_| ())
    }

    async fn send_stats(&self, chat_id: ChatId, stats: &[ViewCount]) -> Result<(), TelegramError> {
        self.send_message(chat_id, &markup::stats(stats))
            .await
            .map(|_| ())
    }

    async fn send_history(
        &self,
        chat_id: ChatId,
        history: &[HistoryRecord],
    ) -> Result<(), TelegramError> {
        self.send_message(chat_id, &markup::history(history))
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.answer_callback_query(callback_id).await
    }

    async fn typing(&self, chat_id: ChatId) -> Result<(), TelegramError> {
        self.send_chat_action(chat_id, "typing").await
    }
}
