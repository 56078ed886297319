//! Effects produced by state transitions

use crate::movie::MovieCandidate;
use crate::session::state::{Controls, MessageId};

/// Where a candidate render goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// Send a fresh message
    NewMessage,
    /// Replace the media and controls of an existing message in place
    EditMessage(MessageId),
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch details, count the view, render. Answers with `Rendered` or
    /// `RenderFailed`.
    ShowCandidate {
        generation: u64,
        index: usize,
        candidate: MovieCandidate,
        controls: Controls,
        target: RenderTarget,
    },

    /// Look up and deliver watch links. Answers with `WatchLinksDelivered`
    /// or `WatchLinksFailed`.
    FetchWatchLinks {
        generation: u64,
        candidate: MovieCandidate,
    },

    /// Remove the inline controls from a rendered message
    DisableControls { message_id: MessageId },

    /// Put the controls back on a message after a failed link lookup
    RestoreControls {
        message_id: MessageId,
        controls: Controls,
    },
}

impl Effect {
    pub fn show_candidate(
        generation: u64,
        index: usize,
        candidate: MovieCandidate,
        controls: Controls,
        target: RenderTarget,
    ) -> Self {
        Effect::ShowCandidate {
            generation,
            index,
            candidate,
            controls,
            target,
        }
    }

    pub fn disable_controls(message_id: MessageId) -> Self {
        Effect::DisableControls { message_id }
    }
}
