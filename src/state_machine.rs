// Copyright 2025 Cowboy AI, LLC.

//! State machine primitives for status lifecycles
//!
//! Every status field in this crate (reservation, order, payment, ticket,
//! artifact) is an enum implementing [`State`] and [`StatusTransitions`].
//! The transition tables are the single source of truth for which moves are
//! legal; services call [`guard_transition`] before asking the persistence
//! context to apply a compare-and-set on the row.
//!
//! The store-level CAS is deliberately mechanical (compare the current
//! status, set the new one); it does not re-validate the transition table.
//! Guards live here, races are decided there.

use crate::errors::{TicketingError, TicketingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Trait for types that can be used as states in a status lifecycle
pub trait State: Debug + Clone + Copy + PartialEq + Eq + Send + Sync {
    /// Get the name of this state for logging/debugging
    fn name(&self) -> &'static str;

    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Transition table for a status lifecycle
pub trait StatusTransitions: State {
    /// Check if a transition to the target state is valid
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Get all valid target states from this state
    fn valid_transitions(&self) -> Vec<Self>;
}

/// Record of a state transition, for audit logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition<S> {
    /// The state before the transition
    pub from: S,
    /// The state after the transition
    pub to: S,
    /// Unique identifier for this transition instance
    pub transition_id: Uuid,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Validate a transition against the state's transition table
///
/// Returns a [`StateTransition`] record on success so callers can log the
/// move with a correlatable transition id.
pub fn guard_transition<S: StatusTransitions>(from: S, to: S) -> TicketingResult<StateTransition<S>> {
    if from.is_terminal() || !from.can_transition_to(&to) {
        return Err(TicketingError::InvalidStateTransition {
            from: from.name().to_string(),
            to: to.name().to_string(),
        });
    }

    Ok(StateTransition {
        from,
        to,
        transition_id: Uuid::new_v4(),
        timestamp: Utc::now(),
    })
}
