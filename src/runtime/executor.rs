//! Chat runtime executor

use super::traits::{LinkFinder, MovieCatalog, Renderer, Storage};
use super::{CallbackAction, Collaborators, Command, Inbound, Notice};

use crate::db::DbError;
use crate::movie::{MovieCandidate, MovieDetails};
use crate::providers::ProviderError;
use crate::session::{
    transition, ChatId, Controls, Direction, Effect, Event, MessageId, RenderTarget,
    SessionError, SessionState,
};
use crate::telegram::TelegramError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// How long an idle chat keeps its actor without any traffic
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Failures while handling one interaction
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Persistence failed: {0}")]
    Persistence(#[from] DbError),
    #[error("Provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] TelegramError),
    #[error("Runtime for chat {0} is not running")]
    RuntimeClosed(ChatId),
    #[error("Chat {0} has too many interactions queued")]
    ChatBusy(ChatId),
}

impl BotError {
    /// What to tell the user, if anything
    pub fn notice(&self) -> Option<Notice> {
        match self {
            BotError::Session(SessionError::StaleInteraction | SessionError::NoCandidates) => {
                Some(Notice::StaleInteraction)
            }
            BotError::Session(SessionError::NoPreviousCandidate) => {
                Some(Notice::NoPreviousCandidate)
            }
            BotError::Session(SessionError::NoNextCandidate) => Some(Notice::NoNextCandidate),
            BotError::Persistence(_) => Some(Notice::PersistenceFailed),
            BotError::Provider(_) => Some(Notice::ProviderFailed),
            // Nothing useful can be said through a channel that just failed
            BotError::Telegram(_) | BotError::RuntimeClosed(_) => None,
            BotError::ChatBusy(_) => Some(Notice::Busy),
        }
    }
}

/// Actor owning the session of one chat
pub struct ChatRuntime<S, C, L, R>
where
    S: Storage + Clone + 'static,
    C: MovieCatalog + 'static,
    L: LinkFinder + 'static,
    R: Renderer + 'static,
{
    chat_id: ChatId,
    state: SessionState,
    /// Generation handed to the next session
    next_generation: u64,
    /// Index the user last saw rendered, restored when an edit fails
    on_screen: Option<usize>,
    idle_timeout: Duration,
    storage: S,
    catalog: Arc<C>,
    links: Arc<L>,
    renderer: Arc<R>,
    inbox: mpsc::Receiver<Inbound>,
}

impl<S, C, L, R> ChatRuntime<S, C, L, R>
where
    S: Storage + Clone + 'static,
    C: MovieCatalog + 'static,
    L: LinkFinder + 'static,
    R: Renderer + 'static,
{
    pub fn new(
        chat_id: ChatId,
        collaborators: Collaborators<S, C, L, R>,
        inbox: mpsc::Receiver<Inbound>,
    ) -> Self {
        let Collaborators {
            storage,
            catalog,
            links,
            renderer,
        } = collaborators;
        Self {
            chat_id,
            state: SessionState::Idle,
            next_generation: 1,
            on_screen: None,
            idle_timeout: IDLE_TIMEOUT,
            storage,
            catalog,
            links,
            renderer,
            inbox,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Process the inbox until every sender is gone, or until the chat has
    /// been quiet for the idle timeout with no session open
    pub async fn run(mut self) {
        tracing::info!(chat_id = %self.chat_id, "Starting chat runtime");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.inbox.recv()).await {
                Ok(Some(inbound)) => self.process(inbound).await,
                Ok(None) => break,
                Err(_) if self.state.is_idle() => {
                    // Refuse new work, then finish what was queued before closing
                    self.inbox.close();
                    while let Some(inbound) = self.inbox.recv().await {
                        self.process(inbound).await;
                    }
                    tracing::debug!(chat_id = %self.chat_id, "Retiring idle chat runtime");
                    break;
                }
                // An open session keeps the actor alive
                Err(_) => {}
            }
        }

        tracing::info!(chat_id = %self.chat_id, "Chat runtime stopped");
    }

    /// Handle one interaction to completion, reporting failures to the user
    pub(crate) async fn process(&mut self, inbound: Inbound) {
        let callback_id = match &inbound {
            Inbound::Callback { callback_id, .. } => Some(callback_id.clone()),
            _ => None,
        };

        if let Err(e) = self.handle(inbound).await {
            if let BotError::Session(_) = &e {
                tracing::debug!(chat_id = %self.chat_id, error = %e, "Interaction rejected");
            } else {
                tracing::error!(chat_id = %self.chat_id, error = %e, "Error handling interaction");
            }
            if let Some(notice) = e.notice() {
                self.notify(&notice).await;
            }
        }

        if let Some(callback_id) = callback_id {
            if let Err(e) = self.renderer.answer_callback(&callback_id).await {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "Failed to answer callback");
            }
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    async fn handle(&mut self, inbound: Inbound) -> Result<(), BotError> {
        match inbound {
            Inbound::Query { text } => self.search(&text).await,
            Inbound::Callback {
                action, message_id, ..
            } => {
                let event = match action {
                    Some(CallbackAction::Previous) => Event::Paginate {
                        direction: Direction::Previous,
                        message_id,
                    },
                    Some(CallbackAction::Next) => Event::Paginate {
                        direction: Direction::Next,
                        message_id,
                    },
                    Some(CallbackAction::Watch) => Event::RequestWatchLinks { message_id },
                    None => return Err(SessionError::StaleInteraction.into()),
                };
                self.process_event(event).await
            }
            Inbound::Command(command) => self.command(command).await,
            Inbound::Unsupported => {
                self.renderer
                    .send_notice(self.chat_id, &Notice::Unsupported)
                    .await?;
                Ok(())
            }
        }
    }

    /// A text query: drop the open session, record the query, search, and
    /// start browsing when anything matched
    async fn search(&mut self, text: &str) -> Result<(), BotError> {
        self.process_event(Event::Reset).await?;

        if let Err(e) = self.renderer.typing(self.chat_id).await {
            tracing::debug!(chat_id = %self.chat_id, error = %e, "Typing indicator failed");
        }

        self.storage
            .append_history(self.chat_id, Utc::now(), text)
            .await?;

        let ids = self.catalog.search(text).await?;
        tracing::info!(chat_id = %self.chat_id, query = %text, found = ids.len(), "Search finished");

        if ids.is_empty() {
            self.renderer
                .send_notice(self.chat_id, &Notice::NotFound)
                .await?;
            return Ok(());
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let candidates = ids.into_iter().map(MovieCandidate::new).collect();
        self.process_event(Event::Start {
            generation,
            candidates,
        })
        .await
    }

    async fn command(&mut self, command: Command) -> Result<(), BotError> {
        tracing::debug!(chat_id = %self.chat_id, ?command, "Command");
        match command {
            Command::Start { first_name } => {
                self.process_event(Event::Reset).await?;
                self.renderer
                    .send_notice(self.chat_id, &Notice::Greeting { first_name })
                    .await?;
            }
            Command::Help => {
                self.process_event(Event::Reset).await?;
                self.renderer.send_notice(self.chat_id, &Notice::Help).await?;
            }
            Command::Restart => {
                self.process_event(Event::Reset).await?;
                self.renderer
                    .send_notice(self.chat_id, &Notice::Restarted)
                    .await?;
            }
            Command::Statistics => {
                let stats = self.storage.list_stats(self.chat_id).await?;
                self.renderer.send_stats(self.chat_id, &stats).await?;
            }
            Command::History => {
                let history = self.storage.list_history(self.chat_id).await?;
                self.renderer.send_history(self.chat_id, &history).await?;
            }
        }
        Ok(())
    }

    async fn process_event(&mut self, event: Event) -> Result<(), BotError> {
        // Follow-ups from effects are chained without recursion
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let follow_up = current_event.follow_up_generation();
            let result = transition(&self.state, current_event)?;

            if let (Some(generation), Some(session)) = (follow_up, self.state.session()) {
                if session.generation != generation {
                    tracing::debug!(chat_id = %self.chat_id, generation, "Ignoring follow-up from an abandoned session");
                }
            }

            self.state = result.new_state;
            if self.state.is_idle() {
                self.on_screen = None;
            }

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ShowCandidate {
                generation,
                index,
                candidate,
                controls,
                target,
            } => {
                Some(
                    self.show_candidate(generation, index, &candidate, controls, target)
                        .await,
                )
            }

            Effect::FetchWatchLinks {
                generation,
                candidate,
            } => Some(self.deliver_watch_links(generation, &candidate).await),

            Effect::DisableControls { message_id } => {
                self.disable_controls(message_id).await;
                None
            }

            Effect::RestoreControls {
                message_id,
                controls,
            } => {
                if let Err(e) = self
                    .renderer
                    .restore_controls(self.chat_id, message_id, controls)
                    .await
                {
                    tracing::warn!(chat_id = %self.chat_id, %message_id, error = %e, "Failed to restore controls");
                }
                None
            }
        }
    }

    /// Fetch details, render, then count the view
    async fn show_candidate(
        &mut self,
        generation: u64,
        index: usize,
        candidate: &MovieCandidate,
        controls: Controls,
        target: RenderTarget,
    ) -> Event {
        let failed = match (target, self.on_screen) {
            (RenderTarget::EditMessage(_), Some(restore_index)) => Event::RenderFailed {
                generation,
                restore_index,
            },
            // Nothing is on screen to go back to
            _ => Event::Reset,
        };

        let details = match self.candidate_details(candidate).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, movie_id = %candidate.id, error = %e, "Failed to fetch details");
                self.notify(&Notice::ProviderFailed).await;
                return failed;
            }
        };

        let message_id = match self
            .renderer
            .show_candidate(self.chat_id, &details, controls, target)
            .await
        {
            Ok(message_id) => message_id,
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, movie_id = %candidate.id, error = %e, "Failed to render candidate");
                self.notify(&Notice::ProviderFailed).await;
                return failed;
            }
        };
        self.on_screen = Some(index);

        // Only renders the user actually got are counted
        match self
            .storage
            .upsert_view_count(self.chat_id, candidate.id, details.display_name())
            .await
        {
            Ok(view) => {
                tracing::info!(chat_id = %self.chat_id, movie_id = %candidate.id, count = view.count, "Counted view");
            }
            Err(e) => {
                tracing::error!(chat_id = %self.chat_id, movie_id = %candidate.id, error = %e, "Failed to count view");
                self.notify(&Notice::PersistenceFailed).await;
            }
        }

        Event::Rendered {
            generation,
            index,
            message_id,
            details,
        }
    }

    async fn deliver_watch_links(&self, generation: u64, candidate: &MovieCandidate) -> Event {
        let result = async {
            let details = self.candidate_details(candidate).await?;
            let links = self.links.find_watch_links(&details).await?;
            tracing::info!(chat_id = %self.chat_id, movie_id = %candidate.id, links = links.len(), "Found watch links");
            self.renderer
                .send_watch_links(self.chat_id, &details, &links)
                .await?;
            Ok::<_, BotError>(())
        }
        .await;

        match result {
            Ok(()) => Event::WatchLinksDelivered { generation },
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, movie_id = %candidate.id, error = %e, "Failed to deliver watch links");
                if let Some(notice) = e.notice() {
                    self.notify(&notice).await;
                }
                Event::WatchLinksFailed { generation }
            }
        }
    }

    async fn disable_controls(&self, message_id: MessageId) {
        if let Err(e) = self.renderer.clear_controls(self.chat_id, message_id).await {
            // Old messages may no longer be editable
            tracing::warn!(chat_id = %self.chat_id, %message_id, error = %e, "Failed to clear controls");
        }
    }

    /// Cached details, or a lookup on first render
    async fn candidate_details(
        &self,
        candidate: &MovieCandidate,
    ) -> Result<Arc<MovieDetails>, ProviderError> {
        if let Some(details) = &candidate.details {
            return Ok(Arc::clone(details));
        }
        self.catalog.details(candidate.id).await.map(Arc::new)
    }

    async fn notify(&self, notice: &Notice) {
        if let Err(e) = self.renderer.send_notice(self.chat_id, notice).await {
            tracing::warn!(chat_id = %self.chat_id, error = %e, ?notice, "Failed to send notice");
        }
    }
}
