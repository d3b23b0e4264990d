// Copyright 2025 Cowboy AI, LLC.

//! Inventory ledger
//!
//! Tracks, per ticket category, total capacity and the stock currently
//! committed (held by a reservation or sold). The counter arithmetic is
//! pure and synchronous; the persistence context applies it as a single
//! conditional update so concurrent buyers on the same category serialize
//! at the row, not behind an external lock.

use crate::entity::{EventId, TicketCategoryId};
use crate::errors::{TicketingError, TicketingResult};
use crate::money::Money;
use crate::persistence::TicketingStore;
use crate::reservation::Reservation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A sellable ticket category of an event
///
/// Read-mostly after creation: only `capacity` changes, and only through
/// the explicit admin adjustment path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCategory {
    /// Category id
    pub id: TicketCategoryId,
    /// Event this category belongs to
    pub event_id: EventId,
    /// Display name ("Early Bird", "VIP", ...)
    pub name: String,
    /// Price per ticket
    pub unit_price: Money,
    /// Total sellable capacity
    pub capacity: u32,
    /// When the category was created
    pub created_at: DateTime<Utc>,
}

impl TicketCategory {
    /// Create a new category
    pub fn new(
        event_id: EventId,
        name: impl Into<String>,
        unit_price: Money,
        capacity: u32,
    ) -> Self {
        Self {
            id: TicketCategoryId::new(),
            event_id,
            name: name.into(),
            unit_price,
            capacity,
            created_at: Utc::now(),
        }
    }
}

/// Per-category inventory counter
///
/// `committed` counts stock that is held by an active reservation or
/// already sold; `sold` is the finalized portion of `committed`.
/// Invariants: `committed <= capacity` and `sold <= committed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCounter {
    /// Category this counter belongs to
    pub category_id: TicketCategoryId,
    /// Total sellable capacity
    pub capacity: u32,
    /// Stock held or sold
    pub committed: u32,
    /// Finalized (sold) portion of `committed`
    pub sold: u32,
}

impl InventoryCounter {
    /// Create the counter for a freshly created category
    pub fn new(category: &TicketCategory) -> Self {
        Self {
            category_id: category.id,
            capacity: category.capacity,
            committed: 0,
            sold: 0,
        }
    }

    /// Stock still available for new holds
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.committed)
    }

    /// Conditionally commit `quantity`: increments `committed` only if the
    /// result stays within capacity. Returns whether the commit was applied.
    pub fn try_commit(&mut self, quantity: u32) -> bool {
        match self.committed.checked_add(quantity) {
            Some(next) if next <= self.capacity => {
                self.committed = next;
                true
            }
            _ => false,
        }
    }

    /// Return a held commitment to available stock
    ///
    /// Only the held (not yet sold) portion may be released; anything else
    /// indicates a double release and trips the invariant.
    pub fn release(&mut self, quantity: u32) -> TicketingResult<()> {
        let held = self.committed - self.sold;
        if quantity > held {
            return Err(TicketingError::Invariant(format!(
                "release of {quantity} exceeds held stock {held} for category {}",
                self.category_id
            )));
        }
        self.committed -= quantity;
        Ok(())
    }

    /// Move a held commitment into the permanent sold state
    ///
    /// A no-op on `committed`; it only forecloses release.
    pub fn finalize(&mut self, quantity: u32) -> TicketingResult<()> {
        let next_sold = self.sold.saturating_add(quantity);
        if next_sold > self.committed {
            return Err(TicketingError::Invariant(format!(
                "finalize of {quantity} exceeds committed stock {} for category {}",
                self.committed, self.category_id
            )));
        }
        self.sold = next_sold;
        Ok(())
    }

    /// Assert the counter invariants hold
    pub fn check(&self) -> TicketingResult<()> {
        if self.committed > self.capacity {
            return Err(TicketingError::Invariant(format!(
                "committed {} exceeds capacity {} for category {}",
                self.committed, self.capacity, self.category_id
            )));
        }
        if self.sold > self.committed {
            return Err(TicketingError::Invariant(format!(
                "sold {} exceeds committed {} for category {}",
                self.sold, self.committed, self.category_id
            )));
        }
        Ok(())
    }
}

/// Outcome of a conditional stock commit at the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockCommit {
    /// The commitment was applied
    Committed,
    /// The commitment did not fit within capacity
    Insufficient {
        /// Stock still available at the time of the attempt
        remaining: u32,
    },
}

/// Receipt for a committed quantity of stock
///
/// Held by whoever owns the commitment (a reservation, then its order) and
/// surrendered back to the ledger on release or finalize. Reconstructable
/// from a reservation row so no token registry is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a commit token must be released or finalized"]
pub struct CommitToken {
    /// Category the stock was committed against
    pub category_id: TicketCategoryId,
    /// Committed quantity
    pub quantity: u32,
}

impl CommitToken {
    /// Rebuild the token backing a reservation's commitment
    pub fn for_reservation(reservation: &Reservation) -> Self {
        Self {
            category_id: reservation.category_id,
            quantity: reservation.quantity,
        }
    }
}

/// Inventory ledger service
///
/// All three operations are atomic with respect to concurrent callers on
/// the same category: each maps to one conditional update in the
/// persistence context.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn TicketingStore>,
}

impl InventoryLedger {
    /// Create a ledger over the given persistence context
    pub fn new(store: Arc<dyn TicketingStore>) -> Self {
        Self { store }
    }

    /// Register a category and its zeroed counter
    pub async fn register_category(&self, category: TicketCategory) -> TicketingResult<()> {
        self.store.insert_category(category).await
    }

    /// Try to commit `quantity` against a category
    ///
    /// Insufficient stock is a business outcome: callers surface it to the
    /// buyer, they do not retry it.
    pub async fn try_commit(
        &self,
        category_id: TicketCategoryId,
        quantity: u32,
    ) -> TicketingResult<CommitToken> {
        match self.store.try_commit_stock(category_id, quantity).await? {
            StockCommit::Committed => Ok(CommitToken {
                category_id,
                quantity,
            }),
            StockCommit::Insufficient { remaining } => Err(TicketingError::InsufficientStock {
                category: category_id.to_string(),
                requested: quantity,
                remaining,
            }),
        }
    }

    /// Release a held commitment back to available stock
    pub async fn release(&self, token: CommitToken) -> TicketingResult<()> {
        self.store
            .release_stock(token.category_id, token.quantity)
            .await?;
        info!(
            category = %token.category_id,
            quantity = token.quantity,
            "released stock commitment"
        );
        Ok(())
    }

    /// Finalize a held commitment into the permanent sold state
    pub async fn finalize(&self, token: CommitToken) -> TicketingResult<()> {
        self.store
            .finalize_stock(token.category_id, token.quantity)
            .await?;
        info!(
            category = %token.category_id,
            quantity = token.quantity,
            "finalized stock commitment as sold"
        );
        Ok(())
    }

    /// Stock still available for new holds
    pub async fn remaining(&self, category_id: TicketCategoryId) -> TicketingResult<u32> {
        let counter = self.store.counter(category_id).await?.ok_or_else(|| {
            TicketingError::NotFound {
                entity_type: "ticket category",
                id: category_id.to_string(),
            }
        })?;
        Ok(counter.remaining())
    }

    /// Admin adjustment of a category's capacity
    ///
    /// Refused if the new capacity would fall below already committed stock.
    pub async fn adjust_capacity(
        &self,
        category_id: TicketCategoryId,
        new_capacity: u32,
    ) -> TicketingResult<()> {
        self.store.adjust_capacity(category_id, new_capacity).await?;
        info!(category = %category_id, new_capacity, "adjusted category capacity");
        Ok(())
    }

    /// Admin adjustment of a category's unit price
    ///
    /// Applies to future orders only; existing order lines carry their own
    /// price snapshots.
    pub async fn adjust_price(
        &self,
        category_id: TicketCategoryId,
        new_price: Money,
    ) -> TicketingResult<()> {
        self.store.set_category_price(category_id, new_price.clone()).await?;
        info!(category = %category_id, new_price = %new_price, "adjusted category price");
        Ok(())
    }
}
