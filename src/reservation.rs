// Copyright 2025 Cowboy AI, LLC.

//! Reservation manager
//!
//! Creates, cancels, converts, and expires short-lived holds against the
//! inventory ledger. The convert-vs-sweep race on an expiring reservation
//! is decided by a single compare-and-set on the status field: whichever
//! side moves the row out of ACTIVE first wins, the loser observes a
//! no-op and takes no side effects.

use crate::config::TicketingConfig;
use crate::entity::{ReservationId, TicketCategoryId, UserId};
use crate::errors::{TicketingError, TicketingResult};
use crate::identifiers::SessionToken;
use crate::inventory::{CommitToken, InventoryLedger};
use crate::persistence::TicketingStore;
use crate::state_machine::{guard_transition, State, StatusTransitions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle states of a reservation
///
/// ACTIVE is the only live state; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Holding stock, waiting to be converted or to expire
    Active,
    /// TTL elapsed; stock returned by the sweep
    Expired,
    /// Bound to an order; commitment now backs the order
    Converted,
    /// Cancelled by its owner or an admin; stock returned
    Cancelled,
}

impl State for ReservationStatus {
    fn name(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Converted => "CONVERTED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl StatusTransitions for ReservationStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(self, ReservationStatus::Active) && !matches!(target, ReservationStatus::Active)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            ReservationStatus::Active => vec![
                ReservationStatus::Expired,
                ReservationStatus::Converted,
                ReservationStatus::Cancelled,
            ],
            _ => vec![],
        }
    }
}

/// The subject a reservation belongs to: an authenticated user or an
/// anonymous session, exactly one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerRef {
    /// Authenticated user
    User(UserId),
    /// Anonymous session
    Session(SessionToken),
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerRef::User(id) => write!(f, "user:{id}"),
            OwnerRef::Session(token) => write!(f, "session:{token}"),
        }
    }
}

/// Who is asking for a privileged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    /// The owning subject itself
    Subject(OwnerRef),
    /// Administrative override
    Admin,
}

impl Requester {
    fn may_act_on(&self, owner: &OwnerRef) -> bool {
        match self {
            Requester::Admin => true,
            Requester::Subject(subject) => subject == owner,
        }
    }
}

/// A time-boxed claim on ticket stock prior to payment
///
/// While ACTIVE, `quantity` counts toward the category's committed stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation id
    pub id: ReservationId,
    /// Category the stock is held against
    pub category_id: TicketCategoryId,
    /// Held quantity
    pub quantity: u32,
    /// Owning subject
    pub owner: OwnerRef,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// When the hold was created
    pub created_at: DateTime<Utc>,
    /// When the hold lapses unless converted or cancelled first
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether the TTL has elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// The ledger commitment backing this reservation
    pub fn commit_token(&self) -> CommitToken {
        CommitToken::for_reservation(self)
    }
}

/// Result of one background sweep pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// Rows matching the sweep predicate
    pub examined: usize,
    /// Rows this pass actually transitioned (the rest lost their CAS to a
    /// concurrent convert/cancel and were left alone)
    pub reclaimed: usize,
}

/// Reservation manager service
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn TicketingStore>,
    ledger: InventoryLedger,
    config: TicketingConfig,
}

impl ReservationManager {
    /// Create a manager over the given persistence context
    pub fn new(
        store: Arc<dyn TicketingStore>,
        ledger: InventoryLedger,
        config: TicketingConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    /// Place a time-boxed hold on `quantity` tickets of a category
    ///
    /// Commits stock first; no reservation row exists unless the ledger
    /// accepted the commitment, and the commitment is returned if the row
    /// cannot be persisted.
    pub async fn create_reservation(
        &self,
        category_id: TicketCategoryId,
        quantity: u32,
        owner: OwnerRef,
        now: DateTime<Utc>,
    ) -> TicketingResult<Reservation> {
        if quantity == 0 {
            return Err(TicketingError::ZeroQuantity);
        }

        let token = self.ledger.try_commit(category_id, quantity).await?;

        let reservation = Reservation {
            id: ReservationId::new(),
            category_id,
            quantity,
            owner,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + self.config.reservation_ttl(),
        };

        if let Err(err) = self.store.insert_reservation(reservation.clone()).await {
            if let Err(release_err) = self.ledger.release(token).await {
                warn!(%release_err, "failed to return commitment after aborted reservation insert");
            }
            return Err(err);
        }

        info!(
            reservation = %reservation.id,
            category = %category_id,
            quantity,
            expires_at = %reservation.expires_at,
            "created reservation"
        );
        Ok(reservation)
    }

    /// Stock still available for new holds (read path, never mutates)
    pub async fn availability(&self, category_id: TicketCategoryId) -> TicketingResult<u32> {
        self.ledger.remaining(category_id).await
    }

    /// Cancel an active reservation and return its stock
    ///
    /// Only the owning subject or an admin may cancel.
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        requester: &Requester,
    ) -> TicketingResult<()> {
        let reservation = self.load(reservation_id).await?;

        if !requester.may_act_on(&reservation.owner) {
            return Err(TicketingError::NotOwner {
                entity_type: "reservation",
                id: reservation_id.to_string(),
            });
        }

        self.take_from_active(&reservation, ReservationStatus::Cancelled)
            .await?;
        self.ledger.release(reservation.commit_token()).await?;
        info!(reservation = %reservation_id, "cancelled reservation");
        Ok(())
    }

    /// Bind an active reservation to an order
    ///
    /// Invoked only by the checkout orchestrator. Does not release the
    /// ledger commitment: it now backs the order instead of the hold.
    /// A reservation past its TTL is refused (and expired on the spot)
    /// even if the sweep has not reached it yet.
    pub(crate) async fn convert(
        &self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> TicketingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;

        if reservation.status == ReservationStatus::Active && reservation.is_expired(now) {
            // Do the sweep's job early rather than convert a stale hold.
            if self.take_from_active(&reservation, ReservationStatus::Expired).await.is_ok() {
                self.ledger.release(reservation.commit_token()).await?;
            }
            return Err(TicketingError::ReservationNotActive {
                id: reservation_id.to_string(),
                status: ReservationStatus::Expired.name().to_string(),
            });
        }

        self.take_from_active(&reservation, ReservationStatus::Converted)
            .await?;
        debug!(reservation = %reservation_id, "converted reservation");
        Ok(reservation)
    }

    /// Compensate a conversion that belongs to an aborted order creation
    ///
    /// The public transition table treats CONVERTED as terminal; this
    /// revert exists solely so a multi-reservation order creation can
    /// unwind without ever exposing a partially-converted state.
    pub(crate) async fn revert_conversion(
        &self,
        reservation_id: ReservationId,
    ) -> TicketingResult<()> {
        let reverted = self
            .store
            .transition_reservation(
                reservation_id,
                ReservationStatus::Converted,
                ReservationStatus::Active,
            )
            .await?;
        if !reverted {
            return Err(TicketingError::Invariant(format!(
                "conversion revert found reservation {reservation_id} not in CONVERTED"
            )));
        }
        warn!(reservation = %reservation_id, "reverted reservation conversion");
        Ok(())
    }

    /// Finalize the ledger commitments behind converted reservations
    ///
    /// Called when the owning order reaches SUCCESS.
    pub(crate) async fn finalize_converted(
        &self,
        reservation_ids: &[ReservationId],
    ) -> TicketingResult<()> {
        for &id in reservation_ids {
            let reservation = self.load(id).await?;
            if reservation.status == ReservationStatus::Converted {
                self.ledger.finalize(reservation.commit_token()).await?;
            }
        }
        Ok(())
    }

    /// Release the ledger commitments behind converted reservations
    ///
    /// Called when the owning order fails, expires, or is cancelled.
    /// Callers gate this on winning the order's status CAS, which makes
    /// the release happen exactly once.
    pub(crate) async fn release_converted(
        &self,
        reservation_ids: &[ReservationId],
    ) -> TicketingResult<u32> {
        let mut released = 0;
        for &id in reservation_ids {
            let reservation = self.load(id).await?;
            if reservation.status == ReservationStatus::Converted {
                self.ledger.release(reservation.commit_token()).await?;
                released += reservation.quantity;
            }
        }
        Ok(released)
    }

    /// Expire active reservations whose TTL elapsed before `now`
    ///
    /// Safe to run concurrently with `convert` on the same rows: the CAS
    /// on status decides the winner, and only the winner releases stock.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> TicketingResult<SweepOutcome> {
        let candidates = self.store.expired_active_reservations(now).await?;
        let mut outcome = SweepOutcome {
            examined: candidates.len(),
            reclaimed: 0,
        };

        for reservation in candidates {
            let won = self
                .store
                .transition_reservation(
                    reservation.id,
                    ReservationStatus::Active,
                    ReservationStatus::Expired,
                )
                .await?;
            if !won {
                // A convert or cancel got there first; nothing to reclaim.
                continue;
            }
            self.ledger.release(reservation.commit_token()).await?;
            outcome.reclaimed += 1;
            debug!(reservation = %reservation.id, "expired reservation");
        }

        if outcome.reclaimed > 0 {
            info!(
                examined = outcome.examined,
                reclaimed = outcome.reclaimed,
                "reservation sweep reclaimed stock"
            );
        }
        Ok(outcome)
    }

    async fn load(&self, reservation_id: ReservationId) -> TicketingResult<Reservation> {
        self.store
            .reservation(reservation_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "reservation",
                id: reservation_id.to_string(),
            })
    }

    /// Move a reservation out of ACTIVE via CAS, mapping a lost race to
    /// the business error carrying the status that won
    async fn take_from_active(
        &self,
        reservation: &Reservation,
        target: ReservationStatus,
    ) -> TicketingResult<()> {
        if reservation.status != ReservationStatus::Active {
            return Err(TicketingError::ReservationNotActive {
                id: reservation.id.to_string(),
                status: reservation.status.name().to_string(),
            });
        }
        let transition = guard_transition(ReservationStatus::Active, target)?;

        let won = self
            .store
            .transition_reservation(reservation.id, ReservationStatus::Active, target)
            .await?;
        if !won {
            let current = self.load(reservation.id).await?;
            return Err(TicketingError::ReservationNotActive {
                id: reservation.id.to_string(),
                status: current.status.name().to_string(),
            });
        }

        debug!(
            reservation = %reservation.id,
            from = transition.from.name(),
            to = transition.to.name(),
            transition = %transition.transition_id,
            "reservation transitioned"
        );
        Ok(())
    }
}
