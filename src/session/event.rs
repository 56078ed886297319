//! Events that drive a session

use crate::movie::{MovieCandidate, MovieDetails};
use crate::session::state::MessageId;
use std::sync::Arc;

/// Pagination direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    /// A search produced candidates; replaces any open session
    Start {
        generation: u64,
        candidates: Vec<MovieCandidate>,
    },
    Paginate {
        direction: Direction,
        message_id: MessageId,
    },
    RequestWatchLinks { message_id: MessageId },
    Reset,

    // Render outcomes
    Rendered {
        generation: u64,
        index: usize,
        message_id: MessageId,
        details: Arc<MovieDetails>,
    },
    RenderFailed {
        generation: u64,
        /// Index that is still on screen
        restore_index: usize,
    },

    // Watch link outcomes
    WatchLinksDelivered { generation: u64 },
    WatchLinksFailed { generation: u64 },
}

impl Event {
    /// Generation a follow-up event was issued under
    pub fn follow_up_generation(&self) -> Option<u64> {
        match self {
            Event::Rendered { generation, .. }
            | Event::RenderFailed { generation, .. }
            | Event::WatchLinksDelivered { generation }
            | Event::WatchLinksFailed { generation } => Some(*generation),
            Event::Start { .. }
            | Event::Paginate { .. }
            | Event::RequestWatchLinks { .. }
            | Event::Reset => None,
        }
    }
}
