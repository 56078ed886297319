//! Movie-selection session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! runtime feeds events in, applies the returned state and executes effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, RenderTarget};
pub use event::{Direction, Event};
pub use state::{ChatId, Controls, MessageId, Session, SessionState};
pub use transition::{transition, SessionError};
