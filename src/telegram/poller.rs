//! Long-polling loop feeding updates into the runtime

use super::types::Update;
use super::TelegramApi;
use crate::runtime::{
    BotError, CallbackAction, Command, Inbound, LinkFinder, MovieCatalog, Renderer,
    RuntimeManager, Storage,
};
use crate::session::{ChatId, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Map an update to the chat it belongs to and what the user did
pub fn route_update(update: &Update) -> Option<(ChatId, Inbound)> {
    if let Some(message) = &update.message {
        let chat_id = ChatId(message.chat.id);
        let inbound = match message.text.as_deref() {
            None => Inbound::Unsupported,
            Some(text) => {
                let first_name = message.from.as_ref().map(|u| u.first_name.as_str());
                match Command::parse(text, first_name) {
                    Some(command) => Inbound::Command(command),
                    // Unknown commands are searched like any other text
                    None => Inbound::Query {
                        text: text.to_string(),
                    },
                }
            }
        };
        return Some((chat_id, inbound));
    }

    if let Some(callback) = &update.callback_query {
        let Some(message) = &callback.message else {
            tracing::debug!(user_id = callback.from.id, "Callback without a message");
            return None;
        };
        let inbound = Inbound::Callback {
            callback_id: callback.id.clone(),
            action: callback.data.as_deref().and_then(CallbackAction::parse),
            message_id: MessageId(message.message_id),
        };
        return Some((ChatId(message.chat.id), inbound));
    }

    None
}

/// Pulls updates with `getUpdates` until cancelled
pub struct Poller<S, C, L, R> {
    api: Arc<TelegramApi>,
    manager: Arc<RuntimeManager<S, C, L, R>>,
    timeout: Duration,
}

impl<S, C, L, R> Poller<S, C, L, R>
where
    S: Storage + Clone + 'static,
    C: MovieCatalog + 'static,
    L: LinkFinder + 'static,
    R: Renderer + 'static,
{
    pub fn new(
        api: Arc<TelegramApi>,
        manager: Arc<RuntimeManager<S, C, L, R>>,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            manager,
            timeout,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(timeout_secs = self.timeout.as_secs(), "Polling for updates");
        let mut offset = 0;

        loop {
            let updates = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.api.get_updates(offset, self.timeout) => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed, backing off");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some((chat_id, inbound)) = route_update(&update) else {
                    continue;
                };
                match self.manager.dispatch(chat_id, inbound).await {
                    Ok(()) => {}
                    Err(e @ BotError::ChatBusy(_)) => {
                        tracing::warn!(%chat_id, error = %e, "Dropped update for a busy chat");
                    }
                    Err(e) => tracing::error!(%chat_id, error = %e, "Failed to dispatch update"),
                }
            }
        }

        let chats = self.manager.active_chats().await;
        tracing::info!(chats, "Polling stopped");
    }
}
