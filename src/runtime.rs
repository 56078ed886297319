//! Runtime for per-chat movie sessions
//!
//! Every chat gets its own actor task fed through an mpsc inbox, so at most
//! one inbound interaction per chat is in flight while different chats run
//! concurrently. Actors of quiet chats with no open session retire and are
//! respawned on the next interaction.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{BotError, ChatRuntime, IDLE_TIMEOUT};
pub use traits::*;

use crate::providers::{GoogleLinkFinder, KinopoiskClient};
use crate::session::{ChatId, MessageId};
use crate::telegram::TelegramApi;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Manager wired with the concrete production collaborators
pub type ProductionManager =
    RuntimeManager<DatabaseStorage, KinopoiskClient, GoogleLinkFinder, TelegramApi>;

pub const INBOX_CAPACITY: usize = 32;

/// Something a user did in a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Free text, treated as a movie search
    Query { text: String },
    /// Press of an inline button
    Callback {
        callback_id: String,
        /// `None` when the button data is not recognised
        action: Option<CallbackAction>,
        message_id: MessageId,
    },
    Command(Command),
    /// Stickers, photos and other content the bot cannot handle
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Previous,
    Next,
    Watch,
}

impl CallbackAction {
    const PREFIX: &'static str = "movie:";

    /// Button payload carried by the inline keyboard
    pub fn data(self) -> &'static str {
        match self {
            CallbackAction::Previous => "movie:previous",
            CallbackAction::Next => "movie:next",
            CallbackAction::Watch => "movie:watch",
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data.strip_prefix(Self::PREFIX)? {
            "previous" => Some(CallbackAction::Previous),
            "next" => Some(CallbackAction::Next),
            "watch" => Some(CallbackAction::Watch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { first_name: Option<String> },
    Help,
    Restart,
    Statistics,
    History,
}

impl Command {
    /// Parse `/name` or `/name@botname`, ignoring arguments
    pub fn parse(text: &str, first_name: Option<&str>) -> Option<Self> {
        let word = text.strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "start" => Some(Command::Start {
                first_name: first_name.map(str::to_string),
            }),
            "help" => Some(Command::Help),
            "restart" => Some(Command::Restart),
            "statistics" => Some(Command::Statistics),
            "history" => Some(Command::History),
            _ => None,
        }
    }
}

/// Short user-facing messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Greeting { first_name: Option<String> },
    Help,
    Restarted,
    NotFound,
    StaleInteraction,
    NoPreviousCandidate,
    NoNextCandidate,
    ProviderFailed,
    PersistenceFailed,
    /// Too many interactions are already queued for the chat
    Busy,
    Unsupported,
}

/// Collaborators shared by every chat runtime
pub struct Collaborators<S, C, L, R> {
    pub storage: S,
    pub catalog: Arc<C>,
    pub links: Arc<L>,
    pub renderer: Arc<R>,
}

impl<S: Clone, C, L, R> Clone for Collaborators<S, C, L, R> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            catalog: Arc::clone(&self.catalog),
            links: Arc::clone(&self.links),
            renderer: Arc::clone(&self.renderer),
        }
    }
}

/// Handle to a running chat actor
#[derive(Clone)]
pub struct ChatHandle {
    pub inbox: mpsc::Sender<Inbound>,
}

/// Manager for all chat runtimes
pub struct RuntimeManager<S, C, L, R> {
    collaborators: Collaborators<S, C, L, R>,
    runtimes: Arc<RwLock<HashMap<ChatId, ChatHandle>>>,
    idle_timeout: Duration,
}

impl<S, C, L, R> RuntimeManager<S, C, L, R>
where
    S: Storage + Clone + 'static,
    C: MovieCatalog + 'static,
    L: LinkFinder + 'static,
    R: Renderer + 'static,
{
    pub fn new(collaborators: Collaborators<S, C, L, R>) -> Self {
        Self {
            collaborators,
            runtimes: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Get or create the actor for a chat
    pub async fn get_or_create(&self, chat_id: ChatId) -> ChatHandle {
        if let Some(handle) = self.runtimes.read().await.get(&chat_id) {
            return handle.clone();
        }

        let mut runtimes = self.runtimes.write().await;
        // Another dispatcher may have won the race for the write lock
        if let Some(handle) = runtimes.get(&chat_id) {
            return handle.clone();
        }

        let (inbox, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let runtime = ChatRuntime::new(chat_id, self.collaborators.clone(), inbox_rx)
            .with_idle_timeout(self.idle_timeout);
        let registry = Arc::clone(&self.runtimes);
        tokio::spawn(async move {
            runtime.run().await;
            forget_closed(&registry, chat_id).await;
            tracing::info!(%chat_id, "Chat runtime finished");
        });

        let handle = ChatHandle { inbox };
        runtimes.insert(chat_id, handle.clone());
        handle
    }

    /// Queue an interaction for a chat without waiting on its actor
    ///
    /// A chat with a full inbox gets a busy notice and the interaction is
    /// dropped, so one slow chat never holds up the others.
    pub async fn dispatch(&self, chat_id: ChatId, inbound: Inbound) -> Result<(), BotError> {
        let handle = self.get_or_create(chat_id).await;
        let inbound = match handle.inbox.try_send(inbound) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(inbound)) => {
                tracing::warn!(%chat_id, "Chat runtime inbox full, dropping interaction");
                self.report_busy(chat_id, inbound);
                return Err(BotError::ChatBusy(chat_id));
            }
            Err(TrySendError::Closed(inbound)) => inbound,
        };

        // The actor retired; start a fresh one for this interaction
        tracing::debug!(%chat_id, "Chat runtime inbox closed, restarting");
        forget_closed(&self.runtimes, chat_id).await;
        self.get_or_create(chat_id)
            .await
            .inbox
            .try_send(inbound)
            .map_err(|_| BotError::RuntimeClosed(chat_id))
    }

    /// Number of chats with a live actor
    pub async fn active_chats(&self) -> usize {
        self.runtimes.read().await.len()
    }

    fn report_busy(&self, chat_id: ChatId, inbound: Inbound) {
        let renderer = Arc::clone(&self.collaborators.renderer);
        tokio::spawn(async move {
            if let Err(e) = renderer.send_notice(chat_id, &Notice::Busy).await {
                tracing::warn!(%chat_id, error = %e, "Failed to send busy notice");
            }
            if let Inbound::Callback { callback_id, .. } = inbound {
                if let Err(e) = renderer.answer_callback(&callback_id).await {
                    tracing::warn!(%chat_id, error = %e, "Failed to answer callback");
                }
            }
        });
    }
}

/// Drop the handle of a chat whose actor has stopped accepting work
async fn forget_closed(runtimes: &RwLock<HashMap<ChatId, ChatHandle>>, chat_id: ChatId) {
    let mut runtimes = runtimes.write().await;
    if runtimes
        .get(&chat_id)
        .is_some_and(|handle| handle.inbox.is_closed())
    {
        runtimes.remove(&chat_id);
    }
}
