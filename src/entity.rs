// Copyright 2025 Cowboy AI, LLC.

//! Typed entity identifiers
//!
//! Every persisted row in this crate is keyed by an [`EntityId`] carrying a
//! phantom marker type, so a reservation id can never be passed where an
//! order id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// A typed entity ID using phantom types for type safety
///
/// IDs are globally unique and persistent. The phantom type parameter
/// ensures that IDs for different entity types cannot be mixed up at
/// compile time.
///
/// # Examples
///
/// ```rust
/// use cim_ticketing::{ReservationId, OrderId};
///
/// let reservation_id = ReservationId::new();
/// let order_id = OrderId::new();
///
/// // These are different types - won't compile if mixed up:
/// // let _: OrderId = reservation_id; // ERROR!
/// assert_ne!(reservation_id.to_string(), order_id.to_string());
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct EntityId<T> {
    id: Uuid,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> EntityId<T> {
    /// Create a new random ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            _phantom: PhantomData,
        }
    }

    /// Create from an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }
}

// Manual impls so that `T` does not need to implement these traits itself.

impl<T> Clone for EntityId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityId<T> {}

impl<T> PartialEq for EntityId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for EntityId<T> {}

impl<T> std::hash::Hash for EntityId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> PartialOrd for EntityId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EntityId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Marker types for the entities of the ticketing domain
pub mod markers {
    /// Marker for events (the concerts tickets are sold for)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMarker;

    /// Marker for ticket categories
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TicketCategoryMarker;

    /// Marker for reservations (time-boxed holds)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReservationMarker;

    /// Marker for orders
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrderMarker;

    /// Marker for payment attempts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PaymentMarker;

    /// Marker for issued tickets
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TicketMarker;

    /// Marker for authenticated users
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserMarker;
}

/// Identifier of an event
pub type EventId = EntityId<markers::EventMarker>;
/// Identifier of a ticket category
pub type TicketCategoryId = EntityId<markers::TicketCategoryMarker>;
/// Identifier of a reservation
pub type ReservationId = EntityId<markers::ReservationMarker>;
/// Identifier of an order
pub type OrderId = EntityId<markers::OrderMarker>;
/// Identifier of a payment attempt
pub type PaymentId = EntityId<markers::PaymentMarker>;
/// Identifier of an issued ticket
pub type TicketId = EntityId<markers::TicketMarker>;
/// Identifier of an authenticated user
pub type UserId = EntityId<markers::UserMarker>;
