//! Mock implementations for testing
//!
//! These mocks enable integration testing of chat runtimes without real I/O.

use super::traits::*;
use super::{ChatRuntime, Collaborators, Inbound, Notice};
use crate::db::{Database, DbError, HistoryRecord, ViewCount};
use crate::movie::{MovieDetails, MovieId};
use crate::providers::{ProviderError, WatchLinks};
use crate::session::{ChatId, Controls, MessageId, RenderTarget, SessionState};
use crate::telegram::TelegramError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn provider_down() -> ProviderError {
    ProviderError::Status {
        provider: "mock",
        status: 503,
    }
}

fn storage_down() -> DbError {
    DbError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    ))
}

// ============================================================================
// Mock Storage
// ============================================================================

/// In-memory database with switches to make writes fail
#[derive(Clone)]
pub struct MockStorage {
    db: Database,
    history_down: Arc<Mutex<bool>>,
    view_counts_down: Arc<Mutex<bool>>,
}

impl MockStorage {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            history_down: Arc::new(Mutex::new(false)),
            view_counts_down: Arc::new(Mutex::new(false)),
        }
    }

    pub fn fail_history(&self, fail: bool) {
        *self.history_down.lock().unwrap() = fail;
    }

    pub fn fail_view_counts(&self, fail: bool) {
        *self.view_counts_down.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn append_history(
        &self,
        chat_id: ChatId,
        at: DateTime<Utc>,
        request: &str,
    ) -> Result<HistoryRecord, DbError> {
        if *self.history_down.lock().unwrap() {
            return Err(storage_down());
        }
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
        if *self.view_counts_down.lock().unwrap() {
            return Err(storage_down());
        }
        self.db.upsert_view_count(chat_id, movie_id, title)
    }

    async fn list_stats(&self, chat_id: ChatId) -> Result<Vec<ViewCount>, DbError> {
        self.db.list_stats(chat_id)
    }
}

// ============================================================================
// Mock Movie Catalog
// ============================================================================

/// Catalog answering from canned search results
#[derive(Default)]
pub struct MockCatalog {
    results: Mutex<HashMap<String, Vec<MovieId>>>,
    failing_details: Mutex<HashSet<MovieId>>,
    search_down: Mutex<bool>,
    /// Keywords whose search never completes
    hanging: Mutex<HashSet<String>>,
    /// Ids whose details were requested, in order
    pub detail_requests: Mutex<Vec<MovieId>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, keyword: &str, ids: &[i64]) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(keyword.to_string(), ids.iter().copied().map(MovieId).collect());
        self
    }

    pub fn fail_details(&self, id: i64) {
        self.failing_details.lock().unwrap().insert(MovieId(id));
    }

    pub fn restore_details(&self, id: i64) {
        self.failing_details.lock().unwrap().remove(&MovieId(id));
    }

    pub fn hang_on(self, keyword: &str) -> Self {
        self.hanging.lock().unwrap().insert(keyword.to_string());
        self
    }

    pub fn fail_search(&self) {
        *self.search_down.lock().unwrap() = true;
    }

    pub fn detail_requests(&self) -> Vec<MovieId> {
        self.detail_requests.lock().unwrap().clone()
    }
}

pub fn movie(id: MovieId) -> MovieDetails {
    MovieDetails {
        id,
        name_en: Some(format!("Movie {id}")),
        ..MovieDetails::default()
    }
}

#[async_trait]
impl MovieCatalog for MockCatalog {
    async fn search(&self, keyword: &str) -> Result<Vec<MovieId>, ProviderError> {
        let hangs = self.hanging.lock().unwrap().contains(keyword);
        if hangs {
            std::future::pending::<()>().await;
        }
        if *self.search_down.lock().unwrap() {
            return Err(provider_down());
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(keyword)
            .cloned()
            .unwrap_or_default())
    }

    async fn details(&self, id: MovieId) -> Result<MovieDetails, ProviderError> {
        self.detail_requests.lock().unwrap().push(id);
        if self.failing_details.lock().unwrap().contains(&id) {
            return Err(provider_down());
        }
        Ok(movie(id))
    }
}

// ============================================================================
// Mock Link Finder
// ============================================================================

/// Link finder returning queued results, empty links when nothing is queued
#[derive(Default)]
pub struct MockLinkFinder {
    responses: Mutex<VecDeque<Result<WatchLinks, ProviderError>>>,
    pub lookups: Mutex<Vec<MovieId>>,
}

impl MockLinkFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_links(&self, links: &[(&str, &str)]) {
        let links = links
            .iter()
            .map(|(source, url)| ((*source).to_string(), (*url).to_string()))
            .collect();
        self.responses.lock().unwrap().push_back(Ok(links));
    }

    pub fn queue_error(&self) {
        self.responses.lock().unwrap().push_back(Err(provider_down()));
    }
}

#[async_trait]
impl LinkFinder for MockLinkFinder {
    async fn find_watch_links(&self, details: &MovieDetails) -> Result<WatchLinks, ProviderError> {
        self.lookups.lock().unwrap().push(details.id);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(WatchLinks::new()))
    }
}

// ============================================================================
// Recording Renderer
// ============================================================================

/// Everything the runtime asked the messaging platform to do
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Candidate {
        movie_id: MovieId,
        controls: Controls,
        target: RenderTarget,
    },
    ClearControls(MessageId),
    RestoreControls(MessageId),
    WatchLinks { movie_id: MovieId, count: usize },
    Notice(Notice),
    Stats(Vec<(MovieId, u64)>),
    History(Vec<String>),
    AnswerCallback(String),
    Typing,
}

/// Renderer that records outputs and hands out increasing message ids
pub struct RecordingRenderer {
    outputs: Mutex<Vec<Output>>,
    next_message_id: Mutex<i64>,
    fail_renders: Mutex<bool>,
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self {
            outputs: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(100),
            fail_renders: Mutex::new(false),
        }
    }
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<Output> {
        self.outputs.lock().unwrap().clone()
    }

    /// Outputs recorded since the last call
    pub fn take(&self) -> Vec<Output> {
        std::mem::take(&mut *self.outputs.lock().unwrap())
    }

    pub fn fail_renders(&self, fail: bool) {
        *self.fail_renders.lock().unwrap() = fail;
    }

    fn record(&self, output: Output) {
        self.outputs.lock().unwrap().push(output);
    }
}

fn send_failed(method: &'static str) -> TelegramError {
    TelegramError::Api {
        method,
        code: Some(400),
        description: "Bad Request".to_string(),
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn show_candidate(
        &self,
        _chat_id: ChatId,
        details: &MovieDetails,
        controls: Controls,
        target: RenderTarget,
    ) -> Result<MessageId, TelegramError> {
        if *self.fail_renders.lock().unwrap() {
            return Err(send_failed("sendPhoto"));
        }
        self.record(Output::Candidate {
            movie_id: details.id,
            controls,
            target,
        });
        match target {
            RenderTarget::EditMessage(message_id) => Ok(message_id),
            RenderTarget::NewMessage => {
                let mut next = self.next_message_id.lock().unwrap();
                let id = MessageId(*next);
                *next += 1;
                Ok(id)
            }
        }
    }

    async fn clear_controls(
        &self,
        _chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TelegramError> {
        self.record(Output::ClearControls(message_id));
        Ok(())
    }

    async fn restore_controls(
        &self,
        _chat_id: ChatId,
        message_id: MessageId,
        _controls: Controls,
    ) -> Result<(), TelegramError> {
        self.record(Output::RestoreControls(message_id));
        Ok(())
    }

    async fn send_watch_links(
        &self,
        _chat_id: ChatId,
        details: &MovieDetails,
        links: &WatchLinks,
    ) -> Result<(), TelegramError> {
        self.record(Output::WatchLinks {
            movie_id: details.id,
            count: links.len(),
        });
        Ok(())
    }

    async fn send_notice(&self, _chat_id: ChatId, notice: &Notice) -> Result<(), TelegramError> {
        self.record(Output::Notice(notice.clone()));
        Ok(())
    }

    async fn send_stats(&self, _chat_id: ChatId, stats: &[ViewCount]) -> Result<(), TelegramError> {
        self.record(Output::Stats(
            stats.iter().map(|v| (v.movie_id, v.count)).collect(),
        ));
        Ok(())
    }

    async fn send_history(
        &self,
        _chat_id: ChatId,
        history: &[HistoryRecord],
    ) -> Result<(), TelegramError> {
        self.record(Output::History(
            history.iter().map(|h| h.request.clone()).collect(),
        ));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.record(Output::AnswerCallback(callback_id.to_string()));
        Ok(())
    }

    async fn typing(&self, _chat_id: ChatId) -> Result<(), TelegramError> {
        self.record(Output::Typing);
        Ok(())
    }
}

// ============================================================================
// Test Chat Builder
// ============================================================================

pub type TestCollaborators =
    Collaborators<MockStorage, MockCatalog, MockLinkFinder, RecordingRenderer>;

/// A chat runtime driven one interaction at a time
pub struct TestChat {
    pub runtime: ChatRuntime<MockStorage, MockCatalog, MockLinkFinder, RecordingRenderer>,
    pub db: Database,
    pub storage: MockStorage,
    pub catalog: Arc<MockCatalog>,
    pub links: Arc<MockLinkFinder>,
    pub renderer: Arc<RecordingRenderer>,
    _inbox: mpsc::Sender<Inbound>,
}

pub fn test_collaborators(db: &Database, catalog: MockCatalog) -> TestCollaborators {
    Collaborators {
        storage: MockStorage::new(db.clone()),
        catalog: Arc::new(catalog),
        links: Arc::new(MockLinkFinder::new()),
        renderer: Arc::new(RecordingRenderer::new()),
    }
}

impl TestChat {
    pub fn new(chat_id: ChatId, catalog: MockCatalog) -> Self {
        let db = Database::open_in_memory().unwrap();
        Self::with_collaborators(chat_id, db.clone(), test_collaborators(&db, catalog))
    }

    pub fn with_collaborators(chat_id: ChatId, db: Database, collaborators: TestCollaborators) -> Self {
        let (inbox, inbox_rx) = mpsc::channel(1);
        let catalog = Arc::clone(&collaborators.catalog);
        let links = Arc::clone(&collaborators.links);
        let renderer = Arc::clone(&collaborators.renderer);
        let storage = collaborators.storage.clone();
        Self {
            runtime: ChatRuntime::new(chat_id, collaborators, inbox_rx),
            db,
            storage,
            catalog,
            links,
            renderer,
            _inbox: inbox,
        }
    }

    pub async fn query(&mut self, text: &str) {
        self.runtime
            .process(Inbound::Query {
                text: text.to_string(),
            })
            .await;
    }

    pub async fn press(&mut self, action: super::CallbackAction, message_id: MessageId) {
        self.runtime
            .process(Inbound::Callback {
                callback_id: format!("cb-{}", action.data()),
                action: Some(action),
                message_id,
            })
            .await;
    }

    pub fn state(&self) -> &SessionState {
        self.runtime.state()
    }

    pub fn index(&self) -> Option<usize> {
        self.state().session().map(|s| s.index)
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.state().session().and_then(|s| s.message_id)
    }

    pub fn count(&self, chat_id: ChatId, movie_id: i64) -> u64 {
        self.db
            .list_stats(chat_id)
            .unwrap()
            .into_iter()
            .find(|v| v.movie_id == MovieId(movie_id))
            .map_or(0, |v| v.count)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BotError, CallbackAction, Command, RuntimeManager, INBOX_CAPACITY};
    use std::time::Duration;

    const CHAT: ChatId = ChatId(7);

    fn matrix_catalog() -> MockCatalog {
        MockCatalog::new().with_results("Matrix", &[301, 302, 303])
    }

    fn candidates_shown(outputs: &[Output]) -> Vec<MovieId> {
        outputs
            .iter()
            .filter_map(|o| match o {
                Output::Candidate { movie_id, .. } => Some(*movie_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_matrix_browsing_scenario() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());

        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.count(CHAT, 301), 1);

        chat.press(CallbackAction::Next, message_id).await;
        assert_eq!(chat.index(), Some(1));
        assert_eq!(chat.count(CHAT, 302), 1);

        chat.press(CallbackAction::Previous, message_id).await;
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.count(CHAT, 301), 2);

        chat.links.queue_links(&[("kino.ru", "https://kino.ru/matrix")]);
        chat.press(CallbackAction::Watch, message_id).await;
        assert!(chat.state().is_idle());

        let outputs = chat.renderer.outputs();
        assert_eq!(
            candidates_shown(&outputs),
            vec![MovieId(301), MovieId(302), MovieId(301)]
        );
        assert!(outputs.contains(&Output::ClearControls(message_id)));
        assert!(outputs.contains(&Output::WatchLinks {
            movie_id: MovieId(301),
            count: 1
        }));
        // Details are fetched once per candidate and reused afterwards
        assert_eq!(chat.catalog.detail_requests(), vec![MovieId(301), MovieId(302)]);
    }

    #[tokio::test]
    async fn test_first_render_is_new_message_and_pages_edit_it() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();
        chat.press(CallbackAction::Next, message_id).await;

        let outputs = chat.renderer.outputs();
        assert!(outputs.contains(&Output::Candidate {
            movie_id: MovieId(301),
            controls: Controls::for_position(0, 3),
            target: RenderTarget::NewMessage,
        }));
        assert!(outputs.contains(&Output::Candidate {
            movie_id: MovieId(302),
            controls: Controls::for_position(1, 3),
            target: RenderTarget::EditMessage(message_id),
        }));
        assert_eq!(chat.message_id(), Some(message_id));
    }

    #[tokio::test]
    async fn test_empty_query_records_history_without_session() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());

        chat.query("").await;
        chat.query("nothing like this").await;

        assert!(chat.state().is_idle());
        let history: Vec<_> = chat
            .db
            .list_history(CHAT)
            .unwrap()
            .into_iter()
            .map(|h| h.request)
            .collect();
        assert_eq!(history, vec!["nothing like this", ""]);
        assert!(chat.db.list_stats(CHAT).unwrap().is_empty());

        let outputs = chat.renderer.outputs();
        assert_eq!(
            outputs
                .iter()
                .filter(|o| **o == Output::Notice(Notice::NotFound))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_boundaries_are_reported_and_answered() {
        let mut chat = TestChat::new(CHAT, MockCatalog::new().with_results("Solo", &[1]));
        chat.query("Solo").await;
        let message_id = chat.message_id().unwrap();
        chat.renderer.take();

        chat.press(CallbackAction::Previous, message_id).await;
        chat.press(CallbackAction::Next, message_id).await;

        assert_eq!(
            chat.renderer.take(),
            vec![
                Output::Notice(Notice::NoPreviousCandidate),
                Output::AnswerCallback("cb-movie:previous".to_string()),
                Output::Notice(Notice::NoNextCandidate),
                Output::AnswerCallback("cb-movie:next".to_string()),
            ]
        );
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.count(CHAT, 1), 1);
    }

    #[tokio::test]
    async fn test_new_query_supersedes_session() {
        let catalog = matrix_catalog().with_results("Dune", &[401, 402]);
        let mut chat = TestChat::new(CHAT, catalog);

        chat.query("Matrix").await;
        let old_message = chat.message_id().unwrap();
        chat.query("Dune").await;
        let new_message = chat.message_id().unwrap();
        assert_ne!(old_message, new_message);
        assert!(chat.renderer.outputs().contains(&Output::ClearControls(old_message)));

        chat.renderer.take();
        chat.press(CallbackAction::Next, old_message).await;
        assert_eq!(chat.renderer.take()[0], Output::Notice(Notice::StaleInteraction));
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.state().session().unwrap().candidates[0].id, MovieId(401));
    }

    #[tokio::test]
    async fn test_buttons_after_watch_are_stale() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();
        chat.press(CallbackAction::Watch, message_id).await;
        assert!(chat.state().is_idle());

        chat.renderer.take();
        chat.press(CallbackAction::Next, message_id).await;
        assert_eq!(chat.renderer.take()[0], Output::Notice(Notice::StaleInteraction));
    }

    #[tokio::test]
    async fn test_unknown_button_is_stale() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        chat.renderer.take();

        chat.runtime
            .process(Inbound::Callback {
                callback_id: "cb".to_string(),
                action: None,
                message_id: MessageId(1),
            })
            .await;
        assert_eq!(
            chat.renderer.take(),
            vec![
                Output::Notice(Notice::StaleInteraction),
                Output::AnswerCallback("cb".to_string())
            ]
        );
        assert_eq!(chat.index(), Some(0));
    }

    #[tokio::test]
    async fn test_watch_link_failure_keeps_session_open() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();

        chat.links.queue_error();
        chat.press(CallbackAction::Watch, message_id).await;

        // The buttons come back so the user can try again
        let session = chat.state().session().unwrap();
        assert!(!session.controls_disabled);
        let outputs = chat.renderer.take();
        let cleared = outputs
            .iter()
            .position(|o| *o == Output::ClearControls(message_id))
            .unwrap();
        let restored = outputs
            .iter()
            .position(|o| *o == Output::RestoreControls(message_id))
            .unwrap();
        assert!(cleared < restored);
        assert!(outputs.contains(&Output::Notice(Notice::ProviderFailed)));

        chat.press(CallbackAction::Watch, message_id).await;
        assert!(chat.state().is_idle());
        let outputs = chat.renderer.take();
        assert!(outputs.contains(&Output::ClearControls(message_id)));
        assert!(!outputs.contains(&Output::RestoreControls(message_id)));
        assert!(outputs
            .iter()
            .any(|o| matches!(o, Output::WatchLinks { .. })));
    }

    #[tokio::test]
    async fn test_failed_page_render_restores_index() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();

        chat.catalog.fail_details(302);
        chat.press(CallbackAction::Next, message_id).await;
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.count(CHAT, 302), 0);
        assert!(chat
            .renderer
            .outputs()
            .contains(&Output::Notice(Notice::ProviderFailed)));

        chat.catalog.restore_details(302);
        chat.renderer.fail_renders(true);
        chat.press(CallbackAction::Next, message_id).await;
        assert_eq!(chat.index(), Some(0));
        assert_eq!(chat.count(CHAT, 302), 0);

        chat.renderer.fail_renders(false);
        chat.press(CallbackAction::Next, message_id).await;
        assert_eq!(chat.index(), Some(1));
        assert_eq!(chat.count(CHAT, 302), 1);
    }

    #[tokio::test]
    async fn test_failed_first_render_leaves_chat_idle() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.renderer.fail_renders(true);
        chat.query("Matrix").await;

        assert!(chat.state().is_idle());
        assert!(chat
            .renderer
            .outputs()
            .contains(&Output::Notice(Notice::ProviderFailed)));
        // Nothing was shown, so nothing was counted
        assert_eq!(chat.count(CHAT, 301), 0);
    }

    #[tokio::test]
    async fn test_view_count_failure_still_renders() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.storage.fail_view_counts(true);
        chat.query("Matrix").await;

        let outputs = chat.renderer.outputs();
        assert_eq!(candidates_shown(&outputs), vec![MovieId(301)]);
        assert!(outputs.contains(&Output::Notice(Notice::PersistenceFailed)));
        assert!(chat.message_id().is_some());
        assert_eq!(chat.count(CHAT, 301), 0);

        // Browsing carries on and counting resumes with the store
        chat.storage.fail_view_counts(false);
        chat.press(CallbackAction::Next, chat.message_id().unwrap()).await;
        assert_eq!(chat.index(), Some(1));
        assert_eq!(chat.count(CHAT, 302), 1);
    }

    #[tokio::test]
    async fn test_history_failure_aborts_query() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.storage.fail_history(true);
        chat.query("Matrix").await;

        assert!(chat.state().is_idle());
        let outputs = chat.renderer.outputs();
        assert!(candidates_shown(&outputs).is_empty());
        assert!(outputs.contains(&Output::Notice(Notice::PersistenceFailed)));
        assert!(chat.db.list_history(CHAT).unwrap().is_empty());
        assert!(chat.catalog.detail_requests().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_reported() {
        let catalog = matrix_catalog();
        catalog.fail_search();
        let mut chat = TestChat::new(CHAT, catalog);
        chat.query("Matrix").await;

        assert!(chat.state().is_idle());
        assert_eq!(chat.db.list_history(CHAT).unwrap().len(), 1);
        assert!(chat
            .renderer
            .outputs()
            .contains(&Output::Notice(Notice::ProviderFailed)));
    }

    #[tokio::test]
    async fn test_commands() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.query("Matrix").await;
        let message_id = chat.message_id().unwrap();
        chat.press(CallbackAction::Next, message_id).await;
        chat.press(CallbackAction::Previous, message_id).await;
        chat.renderer.take();

        chat.runtime.process(Inbound::Command(Command::Statistics)).await;
        chat.runtime.process(Inbound::Command(Command::History)).await;
        chat.runtime.process(Inbound::Command(Command::Restart)).await;

        assert_eq!(
            chat.renderer.take(),
            vec![
                Output::Stats(vec![(MovieId(301), 2), (MovieId(302), 1)]),
                Output::History(vec!["Matrix".to_string()]),
                Output::ClearControls(message_id),
                Output::Notice(Notice::Restarted),
            ]
        );
        assert!(chat.state().is_idle());
    }

    #[tokio::test]
    async fn test_unsupported_content() {
        let mut chat = TestChat::new(CHAT, matrix_catalog());
        chat.runtime.process(Inbound::Unsupported).await;
        assert_eq!(
            chat.renderer.outputs(),
            vec![Output::Notice(Notice::Unsupported)]
        );
    }

    #[tokio::test]
    async fn test_manager_runs_chats_independently() {
        let db = Database::open_in_memory().unwrap();
        let collaborators = test_collaborators(&db, matrix_catalog());
        let renderer = Arc::clone(&collaborators.renderer);
        let manager = RuntimeManager::new(collaborators);

        for chat in [ChatId(1), ChatId(2)] {
            manager
                .dispatch(
                    chat,
                    Inbound::Query {
                        text: "Matrix".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(manager.active_chats().await, 2);

        // Views are counted once the render is out
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let counted = |chat| !db.list_stats(chat).unwrap().is_empty();
        while !(counted(ChatId(1)) && counted(ChatId(2))) {
            assert!(tokio::time::Instant::now() < deadline, "views were not counted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(candidates_shown(&renderer.outputs()).len(), 2);

        // Same movie, two chats, two independent counters
        assert_eq!(db.list_stats(ChatId(1)).unwrap()[0].count, 1);
        assert_eq!(db.list_stats(ChatId(2)).unwrap()[0].count, 1);
        assert_eq!(db.list_history(ChatId(1)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stuck_chat_does_not_block_others() {
        let db = Database::open_in_memory().unwrap();
        let collaborators = test_collaborators(&db, matrix_catalog().hang_on("hang"));
        let renderer = Arc::clone(&collaborators.renderer);
        let manager = RuntimeManager::new(collaborators);

        let dispatched = tokio::time::timeout(Duration::from_secs(2), async {
            let mut busy = 0;
            for _ in 0..INBOX_CAPACITY + 8 {
                let result = manager
                    .dispatch(
                        ChatId(1),
                        Inbound::Query {
                            text: "hang".to_string(),
                        },
                    )
                    .await;
                if let Err(BotError::ChatBusy(chat)) = result {
                    assert_eq!(chat, ChatId(1));
                    busy += 1;
                }
            }
            manager
                .dispatch(
                    ChatId(2),
                    Inbound::Query {
                        text: "Matrix".to_string(),
                    },
                )
                .await
                .unwrap();
            busy
        })
        .await
        .expect("dispatch waited on a stuck chat");
        // One query is stuck in the actor, the inbox holds the next ones
        assert!(dispatched >= 7);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while db.list_stats(ChatId(2)).unwrap().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "chat 2 was not served");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(candidates_shown(&renderer.outputs()), vec![MovieId(301)]);
        assert_eq!(db.list_history(ChatId(2)).unwrap().len(), 1);
        assert_eq!(db.list_stats(ChatId(2)).unwrap()[0].count, 1);

        while !renderer.outputs().contains(&Output::Notice(Notice::Busy)) {
            assert!(tokio::time::Instant::now() < deadline, "busy notice missing");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_idle_chat_runtime_retires_and_restarts() {
        let db = Database::open_in_memory().unwrap();
        let collaborators = test_collaborators(&db, matrix_catalog());
        let manager =
            RuntimeManager::new(collaborators).with_idle_timeout(Duration::from_millis(50));

        let not_found = || Inbound::Query {
            text: "nothing".to_string(),
        };
        manager.dispatch(CHAT, not_found()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while manager.active_chats().await > 0 {
            assert!(tokio::time::Instant::now() < deadline, "idle runtime kept running");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        manager.dispatch(CHAT, not_found()).await.unwrap();
        while db.list_history(CHAT).unwrap().len() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "restarted runtime did not run");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_open_session_keeps_runtime_alive() {
        let db = Database::open_in_memory().unwrap();
        let collaborators = test_collaborators(&db, matrix_catalog());
        let renderer = Arc::clone(&collaborators.renderer);
        let manager =
            RuntimeManager::new(collaborators).with_idle_timeout(Duration::from_millis(20));

        manager
            .dispatch(
                CHAT,
                Inbound::Query {
                    text: "Matrix".to_string(),
                },
            )
            .await
            .unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while candidates_shown(&renderer.outputs()).is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "render did not arrive");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.active_chats().await, 1);
    }
}
