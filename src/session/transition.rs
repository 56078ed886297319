//! Pure state transition function
//!
//! Given the same state and event, `transition` always produces the same new
//! state and effects. All I/O happens in the runtime.

use super::event::Direction;
use super::{Effect, Event, RenderTarget, Session, SessionState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Rejected interactions. None of them change the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Interaction targets a message that is no longer current")]
    StaleInteraction,
    #[error("Already showing the first movie")]
    NoPreviousCandidate,
    #[error("Already showing the last movie")]
    NoNextCandidate,
    #[error("Cannot open a session without candidates")]
    NoCandidates,
}

/// Pure transition function
pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, SessionError> {
    match (state, event) {
        // ============================================================
        // Session start (supersedes anything open)
        // ============================================================
        (_, Event::Start { candidates, .. }) if candidates.is_empty() => {
            Err(SessionError::NoCandidates)
        }

        (state, Event::Start { generation, candidates }) => {
            let session = Session::new(generation, candidates);
            let show = Effect::show_candidate(
                generation,
                0,
                session.current().clone(),
                session.controls(),
                RenderTarget::NewMessage,
            );
            Ok(TransitionResult::new(SessionState::Browsing(session))
                .with_effects(retire_controls(state))
                .with_effect(show))
        }

        // ============================================================
        // Interactions on a rendered message
        // ============================================================
        (SessionState::Idle, Event::Paginate { .. } | Event::RequestWatchLinks { .. }) => {
            Err(SessionError::StaleInteraction)
        }

        (SessionState::Browsing(session), Event::Paginate { message_id, .. })
        | (SessionState::Browsing(session), Event::RequestWatchLinks { message_id })
            if !session.is_current_message(message_id) =>
        {
            Err(SessionError::StaleInteraction)
        }

        (SessionState::Browsing(session), Event::Paginate { direction, message_id }) => {
            let index = match direction {
                Direction::Previous => session
                    .index
                    .checked_sub(1)
                    .ok_or(SessionError::NoPreviousCandidate)?,
                Direction::Next if session.index + 1 < session.candidates.len() => {
                    session.index + 1
                }
                Direction::Next => return Err(SessionError::NoNextCandidate),
            };

            let mut next = session.clone();
            next.index = index;
            next.render_pending = true;
            next.controls_disabled = false;

            let show = Effect::show_candidate(
                next.generation,
                index,
                next.current().clone(),
                next.controls(),
                RenderTarget::EditMessage(message_id),
            );
            Ok(TransitionResult::new(SessionState::Browsing(next)).with_effect(show))
        }

        (SessionState::Browsing(session), Event::RequestWatchLinks { message_id }) => {
            let mut next = session.clone();
            next.controls_disabled = true;

            // Disabling twice is a no-op
            let disable = (!session.controls_disabled).then(|| Effect::disable_controls(message_id));
            let fetch = Effect::FetchWatchLinks {
                generation: next.generation,
                candidate: next.current().clone(),
            };
            Ok(TransitionResult::new(SessionState::Browsing(next))
                .with_effects(disable)
                .with_effect(fetch))
        }

        // ============================================================
        // Reset
        // ============================================================
        (state, Event::Reset) => {
            Ok(TransitionResult::new(SessionState::Idle).with_effects(retire_controls(state)))
        }

        // ============================================================
        // Follow-ups from the runtime
        // ============================================================
        (SessionState::Browsing(session), Event::Rendered { generation, index, message_id, details })
            if session.generation == generation && session.index == index =>
        {
            let mut next = session.clone();
            next.message_id = Some(message_id);
            next.render_pending = false;
            let candidate = &mut next.candidates[index];
            if candidate.details.is_none() {
                candidate.details = Some(details);
            }
            Ok(TransitionResult::new(SessionState::Browsing(next)))
        }

        (SessionState::Browsing(session), Event::RenderFailed { generation, restore_index })
            if session.generation == generation && restore_index < session.candidates.len() =>
        {
            let mut next = session.clone();
            next.index = restore_index;
            next.render_pending = false;
            Ok(TransitionResult::new(SessionState::Browsing(next)))
        }

        (SessionState::Browsing(session), Event::WatchLinksDelivered { generation })
            if session.generation == generation =>
        {
            Ok(TransitionResult::new(SessionState::Idle))
        }

        // The lookup failed: reopen the controls so the user can ask again
        (SessionState::Browsing(session), Event::WatchLinksFailed { generation })
            if session.generation == generation =>
        {
            let mut next = session.clone();
            next.controls_disabled = false;
            let restore = session
                .message_id
                .filter(|_| session.controls_disabled)
                .map(|message_id| Effect::RestoreControls {
                    message_id,
                    controls: session.controls(),
                });
            Ok(TransitionResult::new(SessionState::Browsing(next)).with_effects(restore))
        }

        // Abandoned generations are ignored
        (
            state,
            Event::Rendered { .. }
            | Event::RenderFailed { .. }
            | Event::WatchLinksDelivered { .. }
            | Event::WatchLinksFailed { .. },
        ) => Ok(TransitionResult::new(state.clone())),
    }
}

/// Controls on a session's message go away when the session does
fn retire_controls(state: &SessionState) -> Option<Effect> {
    state
        .session()
        .and_then(Session::live_message)
        .map(Effect::disable_controls)
}
