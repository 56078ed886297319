//! Session state types

use crate::movie::MovieCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation identity supplied by the messaging platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message rendered by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Per-conversation state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// No selection dialogue is open
    #[default]
    Idle,

    /// The user is paging through candidates
    Browsing(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Idle => None,
            SessionState::Browsing(session) => Some(session),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// An open movie-selection dialogue
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Bumped for every new session in the conversation; follow-up events
    /// issued under an older generation are ignored.
    pub generation: u64,
    /// Search hits, in provider order. Never empty.
    pub candidates: Vec<MovieCandidate>,
    /// Currently selected candidate, always `< candidates.len()`
    pub index: usize,
    /// Message carrying the current render, `None` until the first render lands
    pub message_id: Option<MessageId>,
    /// Whether the inline controls on `message_id` were removed
    pub controls_disabled: bool,
    /// A render for `index` was requested and has not completed yet
    pub render_pending: bool,
}

impl Session {
    pub fn new(generation: u64, candidates: Vec<MovieCandidate>) -> Self {
        Self {
            generation,
            candidates,
            index: 0,
            message_id: None,
            controls_disabled: false,
            render_pending: true,
        }
    }

    pub fn current(&self) -> &MovieCandidate {
        &self.candidates[self.index]
    }

    pub fn controls(&self) -> Controls {
        Controls::for_position(self.index, self.candidates.len())
    }

    /// Message whose controls are still clickable, if any
    pub fn live_message(&self) -> Option<MessageId> {
        self.message_id.filter(|_| !self.controls_disabled)
    }

    /// Whether an interaction on `message_id` targets the current render
    pub fn is_current_message(&self, message_id: MessageId) -> bool {
        self.message_id == Some(message_id)
    }
}

// ============================================================================
// Controls
// ============================================================================

/// Interactive controls attached to a rendered candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub previous: bool,
    pub next: bool,
    pub watch: bool,
}

impl Controls {
    /// No wraparound: "previous" only past the first candidate, "next" only
    /// before the last one. "watch" is always offered.
    pub fn for_position(index: usize, count: usize) -> Self {
        Self {
            previous: index > 0,
            next: index + 1 < count,
            watch: true,
        }
    }
}
