// Copyright 2025 Cowboy AI, LLC.

//! Error types for ticketing domain operations
//!
//! The error set is closed and typed: callers switch on variants, never on
//! message strings. [`TicketingError::kind`] classifies each variant into
//! the three handling tiers the API boundary cares about.

use thiserror::Error;

/// Errors that can occur in ticketing domain operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketingError {
    /// Referenced entity does not exist
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Type of entity that wasn't found
        entity_type: &'static str,
        /// ID that was searched for
        id: String,
    },

    /// A hold or order line was requested with zero quantity
    #[error("quantity must be positive")]
    ZeroQuantity,

    /// Not enough uncommitted stock to satisfy a hold request
    ///
    /// This is a normal business outcome under contention, not a fault.
    #[error("insufficient stock for category {category}: requested {requested}, remaining {remaining}")]
    InsufficientStock {
        /// Category the hold was requested against
        category: String,
        /// Quantity requested
        requested: u32,
        /// Quantity still available
        remaining: u32,
    },

    /// Admin capacity adjustment would drop below already committed stock
    #[error("capacity {requested} is below committed stock {committed}")]
    InvalidCapacity {
        /// Requested new capacity
        requested: u32,
        /// Stock already committed (held + sold)
        committed: u32,
    },

    /// The reservation is no longer active (expired, converted, or cancelled)
    #[error("reservation {id} is {status}, expected ACTIVE")]
    ReservationNotActive {
        /// Reservation id
        id: String,
        /// Status observed instead of ACTIVE
        status: String,
    },

    /// The requester does not own the entity it tried to act on
    #[error("requester does not own {entity_type} {id}")]
    NotOwner {
        /// Type of entity
        entity_type: &'static str,
        /// Entity id
        id: String,
    },

    /// Reservations with differing currencies cannot share an order
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// First currency observed
        left: String,
        /// Conflicting currency
        right: String,
    },

    /// An order must be created from at least one reservation
    #[error("order must contain at least one reservation")]
    EmptyOrder,

    /// Monetary arithmetic left the representable minor-unit range
    #[error("amount exceeds the representable range")]
    AmountOverflow,

    /// The order is not in the status the operation requires
    #[error("order {id} is {status}, expected {expected}")]
    OrderNotInStatus {
        /// Order id
        id: String,
        /// Status observed
        status: String,
        /// Status the operation requires
        expected: String,
    },

    /// The ticket is not in the status the operation requires
    #[error("ticket {id} is {status}, expected {expected}")]
    TicketNotInStatus {
        /// Ticket id
        id: String,
        /// Status observed
        status: String,
        /// Status the operation requires
        expected: String,
    },

    /// Attempted state transition not permitted by the transition table
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Attempted target state
        to: String,
    },

    /// The payment gateway could not be reached or timed out
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The payment gateway refused the intent request
    #[error("payment gateway rejected request: {0}")]
    GatewayRejected(String),

    /// Ticket artifact generation failed (retryable, never fatal for an order)
    #[error("artifact generation failed: {0}")]
    ArtifactGeneration(String),

    /// Persistence layer failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Invariant violation; indicates a concurrency-control defect, not
    /// a condition to correct silently
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Handling tier of an error, as seen from the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected business outcome; surface to the end user, never retry
    Business,
    /// Transient infrastructure failure; retry out of band
    Transient,
    /// Bug-class invariant violation; alert, do not correct silently
    Fatal,
}

impl TicketingError {
    /// Classify this error for API-boundary handling
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::ZeroQuantity
            | Self::InsufficientStock { .. }
            | Self::InvalidCapacity { .. }
            | Self::ReservationNotActive { .. }
            | Self::NotOwner { .. }
            | Self::CurrencyMismatch { .. }
            | Self::EmptyOrder
            | Self::AmountOverflow
            | Self::OrderNotInStatus { .. }
            | Self::TicketNotInStatus { .. }
            | Self::InvalidStateTransition { .. }
            | Self::GatewayRejected(_) => ErrorKind::Business,
            Self::GatewayUnavailable(_) | Self::ArtifactGeneration(_) | Self::Storage(_) => {
                ErrorKind::Transient
            }
            Self::Invariant(_) => ErrorKind::Fatal,
        }
    }
}

/// Result type for ticketing domain operations
pub type TicketingResult<T> = Result<T, TicketingError>;
