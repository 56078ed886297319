//! Telegram Bot API adapter
//!
//! A small client over `reqwest` for the handful of methods the bot uses,
//! the long-polling loop that feeds the runtime, and MarkdownV2 formatting.

mod api;
pub mod markup;
mod poller;
mod types;

pub use api::TelegramApi;
pub use poller::Poller;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered `ok: false`
    #[error("{method} failed ({code:?}): {description}")]
    Api {
        method: &'static str,
        code: Option<i64>,
        description: String,
    },

    #[error("{method} returned no result")]
    MissingResult { method: &'static str },
}

impl TelegramError {
    /// Edits that change nothing are reported as errors by the Bot API
    pub fn is_not_modified(&self) -> bool {
        matches!(self, TelegramError::Api { description, .. } if description.contains("message is not modified"))
    }
}
