//! Property-based tests for the session state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::event::Direction;
use super::state::*;
use super::transition::*;
use super::*;
use crate::movie::{MovieCandidate, MovieDetails, MovieId};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn candidates(count: usize) -> Vec<MovieCandidate> {
    (1..=count)
        .map(|id| MovieCandidate::new(MovieId(i64::try_from(id).unwrap())))
        .collect()
}

/// Feed the follow-up a successful render would produce
fn land_render(state: SessionState, effects: &[Effect], message_id: MessageId) -> SessionState {
    let Some(Effect::ShowCandidate {
        generation,
        index,
        candidate,
        ..
    }) = effects
        .iter()
        .find(|e| matches!(e, Effect::ShowCandidate { .. }))
    else {
        return state;
    };
    let details = Arc::new(MovieDetails {
        id: candidate.id,
        ..MovieDetails::default()
    });
    transition(
        &state,
        Event::Rendered {
            generation: *generation,
            index: *index,
            message_id,
            details,
        },
    )
    .unwrap()
    .new_state
}

fn started(count: usize, message_id: MessageId) -> SessionState {
    let result = transition(
        &SessionState::Idle,
        Event::Start {
            generation: 1,
            candidates: candidates(count),
        },
    )
    .unwrap();
    land_render(result.new_state, &result.effects, message_id)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Previous), Just(Direction::Next)]
}

fn arb_message_id() -> impl Strategy<Value = MessageId> {
    (1i64..6).prop_map(MessageId)
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (1u64..4, 0usize..4).prop_map(|(generation, count)| Event::Start {
            generation,
            candidates: candidates(count),
        }),
        (arb_direction(), arb_message_id())
            .prop_map(|(direction, message_id)| Event::Paginate { direction, message_id }),
        arb_message_id().prop_map(|message_id| Event::RequestWatchLinks { message_id }),
        Just(Event::Reset),
        (1u64..4, 0usize..4, arb_message_id()).prop_map(|(generation, index, message_id)| {
            Event::Rendered {
                generation,
                index,
                message_id,
                details: Arc::new(MovieDetails::default()),
            }
        }),
        (1u64..4, 0usize..4).prop_map(|(generation, restore_index)| Event::RenderFailed {
            generation,
            restore_index,
        }),
        (1u64..4).prop_map(|generation| Event::WatchLinksDelivered { generation }),
        (1u64..4).prop_map(|generation| Event::WatchLinksFailed { generation }),
    ]
}

fn is_valid_state(state: &SessionState) -> bool {
    match state {
        SessionState::Idle => true,
        SessionState::Browsing(session) => {
            !session.candidates.is_empty() && session.index < session.candidates.len()
        }
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: Valid state after any sequence of events
    #[test]
    fn prop_transitions_preserve_validity(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut state = SessionState::Idle;
        for event in events {
            if let Ok(result) = transition(&state, event) {
                state = result.new_state;
                prop_assert!(is_valid_state(&state), "Invalid state: {:?}", state);
            }
        }
    }

    // Invariant 2: Paging forward visits every index exactly once, in order
    #[test]
    fn prop_next_visits_every_index_once(count in 1usize..12) {
        let message_id = MessageId(1);
        let mut state = started(count, message_id);
        let mut visited = vec![0];

        loop {
            match transition(&state, Event::Paginate { direction: Direction::Next, message_id }) {
                Ok(result) => {
                    let index = result.new_state.session().unwrap().index;
                    visited.push(index);
                    state = land_render(result.new_state, &result.effects, message_id);
                }
                Err(e) => {
                    prop_assert_eq!(e, SessionError::NoNextCandidate);
                    break;
                }
            }
        }

        prop_assert_eq!(visited, (0..count).collect::<Vec<_>>());
    }

    // Invariant 3: Every render of a candidate is announced by exactly one ShowCandidate
    #[test]
    fn prop_each_render_counts_once(
        count in 1usize..6,
        moves in proptest::collection::vec(arb_direction(), 0..20)
    ) {
        let message_id = MessageId(1);
        let mut state = started(count, message_id);
        let mut renders = 1;

        for direction in moves {
            if let Ok(result) = transition(&state, Event::Paginate { direction, message_id }) {
                let shows = result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::ShowCandidate { .. }))
                    .count();
                prop_assert_eq!(shows, 1);
                renders += shows;
                state = land_render(result.new_state, &result.effects, message_id);
            }
        }
        prop_assert!(renders >= 1);
    }

    // Invariant 4: Mismatched message ids are stale and change nothing
    #[test]
    fn prop_mismatched_message_is_stale(
        count in 1usize..6,
        current in 1i64..100,
        other in 1i64..100,
        direction in arb_direction(),
        watch in any::<bool>()
    ) {
        prop_assume!(current != other);
        let state = started(count, MessageId(current));
        let event = if watch {
            Event::RequestWatchLinks { message_id: MessageId(other) }
        } else {
            Event::Paginate { direction, message_id: MessageId(other) }
        };

        let result = transition(&state, event);
        prop_assert_eq!(result.unwrap_err(), SessionError::StaleInteraction);
    }

    // Invariant 5: Boundary navigation fails and leaves the index alone
    #[test]
    fn prop_boundaries_reject(count in 1usize..10) {
        let message_id = MessageId(5);
        let first = started(count, message_id);
        let result = transition(&first, Event::Paginate { direction: Direction::Previous, message_id });
        prop_assert_eq!(result.unwrap_err(), SessionError::NoPreviousCandidate);
        prop_assert_eq!(first.session().unwrap().index, 0);

        let mut last = first;
        if let SessionState::Browsing(session) = &mut last {
            session.index = count - 1;
        }
        let result = transition(&last, Event::Paginate { direction: Direction::Next, message_id });
        prop_assert_eq!(result.unwrap_err(), SessionError::NoNextCandidate);
        prop_assert_eq!(last.session().unwrap().index, count - 1);
    }

    // Invariant 6: A new start always wins over whatever was open
    #[test]
    fn prop_start_replaces_session(
        events in proptest::collection::vec(arb_event(), 0..15),
        count in 1usize..5
    ) {
        let mut state = SessionState::Idle;
        for event in events {
            if let Ok(result) = transition(&state, event) {
                state = result.new_state;
            }
        }

        let result = transition(&state, Event::Start { generation: 9, candidates: candidates(count) }).unwrap();
        let session = result.new_state.session().unwrap();
        prop_assert_eq!(session.generation, 9);
        prop_assert_eq!(session.index, 0);
        prop_assert_eq!(session.message_id, None);
        prop_assert_eq!(session.candidates.len(), count);
    }
}
