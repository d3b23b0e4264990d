// Copyright 2025 Cowboy AI, LLC.

//! Order and checkout orchestration
//!
//! Creates orders from active reservations, drives checkout against the
//! payment gateway, and owns the pending-order timeout sweep. Order
//! creation is all-or-nothing: either every backing reservation converts,
//! or none remain converted and no order row is persisted.

use crate::config::TicketingConfig;
use crate::entity::{OrderId, ReservationId, TicketCategoryId, UserId};
use crate::errors::{TicketingError, TicketingResult};
use crate::gateway::{PaymentGateway, PaymentIntentRequest};
use crate::identifiers::{ExternalReference, InvoiceNumber, SessionToken};
use crate::money::{Currency, Money};
use crate::payment::{Payment, PaymentChannel};
use crate::persistence::TicketingStore;
use crate::reservation::{OwnerRef, Requester, ReservationManager, ReservationStatus, SweepOutcome};
use crate::state_machine::{guard_transition, State, StatusTransitions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle states of an order
///
/// Monotonic except SUCCESS ↔ REFUNDED; there is no way back to PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Awaiting payment
    Pending,
    /// Paid; tickets issued (or issuance pending out-of-band retry)
    Success,
    /// Payment failed
    Failed,
    /// Pending timeout elapsed before payment
    Expired,
    /// Cancelled by the buyer or an admin while pending
    Cancelled,
    /// Refunded after success; ticket invalidation is an external policy
    Refunded,
}

impl State for OrderStatus {
    fn name(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Success => "SUCCESS",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Failed | OrderStatus::Expired | OrderStatus::Cancelled
        )
    }
}

impl StatusTransitions for OrderStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Success)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Pending, OrderStatus::Expired)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Success, OrderStatus::Refunded)
                | (OrderStatus::Refunded, OrderStatus::Success)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            OrderStatus::Pending => vec![
                OrderStatus::Success,
                OrderStatus::Failed,
                OrderStatus::Expired,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Success => vec![OrderStatus::Refunded],
            OrderStatus::Refunded => vec![OrderStatus::Success],
            _ => vec![],
        }
    }
}

/// Who is buying: an authenticated user, or a guest session with an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyerIdentity {
    /// Authenticated user
    User {
        /// User id
        user_id: UserId,
    },
    /// Guest checkout
    Guest {
        /// Session the guest is browsing under
        session: SessionToken,
        /// Contact email for the receipt and tickets
        email: String,
    },
}

impl BuyerIdentity {
    /// The subject reference this buyer reserves and orders under
    pub fn owner_ref(&self) -> OwnerRef {
        match self {
            BuyerIdentity::User { user_id } => OwnerRef::User(*user_id),
            BuyerIdentity::Guest { session, .. } => OwnerRef::Session(session.clone()),
        }
    }

    /// Contact email, when known
    pub fn email(&self) -> Option<&str> {
        match self {
            BuyerIdentity::User { .. } => None,
            BuyerIdentity::Guest { email, .. } => Some(email),
        }
    }
}

/// One order line: a category, a quantity, and the unit price frozen at
/// order creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Category ordered
    pub category_id: TicketCategoryId,
    /// Quantity ordered
    pub quantity: u32,
    /// Unit price snapshot; later price changes never touch it
    pub unit_price: Money,
}

impl OrderLine {
    /// Line subtotal; overflow is refused
    pub fn subtotal(&self) -> TicketingResult<Money> {
        self.unit_price.scaled(self.quantity)
    }
}

/// An order over one or more converted reservations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Unique human-referenceable invoice number
    pub invoice: InvoiceNumber,
    /// Buyer identity
    pub buyer: BuyerIdentity,
    /// Line items with price snapshots
    pub lines: Vec<OrderLine>,
    /// Total amount, frozen at creation
    pub amount: Money,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Reservations backing this order (retained for ledger bookkeeping)
    pub reservation_ids: Vec<ReservationId>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When payment was confirmed, if it was
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Total ticket count across all lines
    pub fn ticket_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// What the buyer needs to complete payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutInstruction {
    /// The order being paid
    pub order_id: OrderId,
    /// Invoice the payment settles
    pub invoice: InvoiceNumber,
    /// Gateway redirect, absent for manual bank transfer
    pub redirect_url: Option<String>,
    /// Reference the gateway (or the manual flow) will call back with
    pub external_reference: ExternalReference,
}

/// Order and checkout orchestrator service
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn TicketingStore>,
    reservations: ReservationManager,
    gateway: Arc<dyn PaymentGateway>,
    config: TicketingConfig,
}

impl CheckoutOrchestrator {
    /// Create an orchestrator over the given collaborators
    pub fn new(
        store: Arc<dyn TicketingStore>,
        reservations: ReservationManager,
        gateway: Arc<dyn PaymentGateway>,
        config: TicketingConfig,
    ) -> Self {
        Self {
            store,
            reservations,
            gateway,
            config,
        }
    }

    /// Create a PENDING order from one or more active reservations
    ///
    /// Preconditions: every reservation is ACTIVE, owned by the buyer, and
    /// all categories share one currency. Prices are snapshotted into the
    /// line items at this moment. If any conversion loses to the expiry
    /// sweep, conversions already made are reverted and no order row is
    /// persisted.
    pub async fn create_order_from_reservations(
        &self,
        reservation_ids: &[ReservationId],
        buyer: &BuyerIdentity,
        now: DateTime<Utc>,
    ) -> TicketingResult<Order> {
        if reservation_ids.is_empty() {
            return Err(TicketingError::EmptyOrder);
        }

        let owner = buyer.owner_ref();
        let mut lines = Vec::with_capacity(reservation_ids.len());
        let mut currency: Option<Currency> = None;

        for &reservation_id in reservation_ids {
            let reservation = self
                .store
                .reservation(reservation_id)
                .await?
                .ok_or_else(|| TicketingError::NotFound {
                    entity_type: "reservation",
                    id: reservation_id.to_string(),
                })?;

            if reservation.owner != owner {
                return Err(TicketingError::NotOwner {
                    entity_type: "reservation",
                    id: reservation_id.to_string(),
                });
            }
            if reservation.status != ReservationStatus::Active {
                return Err(TicketingError::ReservationNotActive {
                    id: reservation_id.to_string(),
                    status: reservation.status.name().to_string(),
                });
            }

            let category = self
                .store
                .category(reservation.category_id)
                .await?
                .ok_or_else(|| TicketingError::NotFound {
                    entity_type: "ticket category",
                    id: reservation.category_id.to_string(),
                })?;

            match &currency {
                None => currency = Some(category.unit_price.currency.clone()),
                Some(expected) if *expected != category.unit_price.currency => {
                    return Err(TicketingError::CurrencyMismatch {
                        left: expected.code().to_string(),
                        right: category.unit_price.currency.code().to_string(),
                    });
                }
                Some(_) => {}
            }

            lines.push(OrderLine {
                category_id: reservation.category_id,
                quantity: reservation.quantity,
                unit_price: category.unit_price,
            });
        }

        let currency = currency.ok_or(TicketingError::EmptyOrder)?;
        let mut amount = Money::zero(currency);
        for line in &lines {
            amount = amount.checked_add(&line.subtotal()?)?;
        }

        // Convert every reservation; unwind on the first loss. After this
        // block either all are CONVERTED or none are.
        let mut converted: Vec<ReservationId> = Vec::with_capacity(reservation_ids.len());
        for &reservation_id in reservation_ids {
            match self.reservations.convert(reservation_id, now).await {
                Ok(_) => converted.push(reservation_id),
                Err(err) => {
                    self.unwind_conversions(&converted).await;
                    return Err(err);
                }
            }
        }

        let order = Order {
            id: OrderId::new(),
            invoice: InvoiceNumber::generate(now),
            buyer: buyer.clone(),
            lines,
            amount,
            status: OrderStatus::Pending,
            reservation_ids: reservation_ids.to_vec(),
            created_at: now,
            paid_at: None,
        };

        if let Err(err) = self.store.insert_order(order.clone()).await {
            self.unwind_conversions(&converted).await;
            return Err(err);
        }

        info!(
            order = %order.id,
            invoice = %order.invoice,
            amount = %order.amount,
            reservations = order.reservation_ids.len(),
            "created order"
        );
        Ok(order)
    }

    /// Initiate checkout for a pending order
    ///
    /// Requests a payment intent from the gateway under a bounded timeout
    /// (no ledger state is held across the round trip), persists a PENDING
    /// payment row with the gateway's reference, and returns the redirect
    /// instruction. Gateway failure leaves the order PENDING; the caller
    /// may retry.
    pub async fn initiate_checkout(
        &self,
        order_id: OrderId,
        channel: PaymentChannel,
        buyer: &BuyerIdentity,
    ) -> TicketingResult<CheckoutInstruction> {
        let order = self.load(order_id).await?;

        if order.buyer.owner_ref() != buyer.owner_ref() {
            return Err(TicketingError::NotOwner {
                entity_type: "order",
                id: order_id.to_string(),
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(TicketingError::OrderNotInStatus {
                id: order_id.to_string(),
                status: order.status.name().to_string(),
                expected: OrderStatus::Pending.name().to_string(),
            });
        }

        let (external_reference, redirect_url) = match channel {
            PaymentChannel::ManualTransfer => {
                (ExternalReference::for_manual(&order.invoice), None)
            }
            PaymentChannel::Gateway => {
                let request = PaymentIntentRequest {
                    invoice: order.invoice.clone(),
                    amount: order.amount.clone(),
                    customer_email: order.buyer.email().map(str::to_string),
                };
                let intent =
                    tokio::time::timeout(
                        self.config.gateway_timeout(),
                        self.gateway.create_payment_intent(request),
                    )
                    .await
                    .map_err(|_| {
                        TicketingError::GatewayUnavailable(
                            "payment intent request timed out".to_string(),
                        )
                    })??;
                (intent.external_reference, Some(intent.redirect_url))
            }
        };

        let payment = Payment::new(order.id, channel, external_reference.clone());
        self.store.insert_payment(payment).await?;

        info!(
            order = %order_id,
            invoice = %order.invoice,
            external_reference = %external_reference,
            ?channel,
            "initiated checkout"
        );
        Ok(CheckoutInstruction {
            order_id,
            invoice: order.invoice,
            redirect_url,
            external_reference,
        })
    }

    /// Cancel a pending order and return its reservations' stock
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        requester: &Requester,
    ) -> TicketingResult<()> {
        let order = self.load(order_id).await?;

        let authorized = match requester {
            Requester::Admin => true,
            Requester::Subject(subject) => *subject == order.buyer.owner_ref(),
        };
        if !authorized {
            return Err(TicketingError::NotOwner {
                entity_type: "order",
                id: order_id.to_string(),
            });
        }

        self.take_from_pending(&order, OrderStatus::Cancelled).await?;
        let released = self
            .reservations
            .release_converted(&order.reservation_ids)
            .await?;
        info!(order = %order_id, released, "cancelled order");
        Ok(())
    }

    /// Expire pending orders older than the configured timeout
    ///
    /// Independent of the reservation TTL: conversion locked the stock to
    /// the order, and this sweep is what gives it back when payment never
    /// arrives.
    pub async fn sweep_stale_orders(&self, now: DateTime<Utc>) -> TicketingResult<SweepOutcome> {
        let cutoff = now - self.config.order_timeout();
        let candidates = self.store.stale_pending_orders(cutoff).await?;
        let mut outcome = SweepOutcome {
            examined: candidates.len(),
            reclaimed: 0,
        };

        for order in candidates {
            let won = self
                .store
                .transition_order(order.id, OrderStatus::Pending, OrderStatus::Expired, None)
                .await?;
            if !won {
                continue;
            }
            self.reservations
                .release_converted(&order.reservation_ids)
                .await?;
            outcome.reclaimed += 1;
            info!(order = %order.id, invoice = %order.invoice, "expired stale order");
        }

        Ok(outcome)
    }

    async fn load(&self, order_id: OrderId) -> TicketingResult<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "order",
                id: order_id.to_string(),
            })
    }

    async fn take_from_pending(&self, order: &Order, target: OrderStatus) -> TicketingResult<()> {
        if order.status != OrderStatus::Pending {
            return Err(TicketingError::OrderNotInStatus {
                id: order.id.to_string(),
                status: order.status.name().to_string(),
                expected: OrderStatus::Pending.name().to_string(),
            });
        }
        guard_transition(OrderStatus::Pending, target)?;

        let won = self
            .store
            .transition_order(order.id, OrderStatus::Pending, target, None)
            .await?;
        if !won {
            let current = self.load(order.id).await?;
            return Err(TicketingError::OrderNotInStatus {
                id: order.id.to_string(),
                status: current.status.name().to_string(),
                expected: OrderStatus::Pending.name().to_string(),
            });
        }
        Ok(())
    }

    async fn unwind_conversions(&self, converted: &[ReservationId]) {
        for &reservation_id in converted {
            if let Err(err) = self.reservations.revert_conversion(reservation_id).await {
                // Leaves a CONVERTED reservation with no order; surfaced
                // loudly because stock stays committed until an operator
                // intervenes.
                error!(reservation = %reservation_id, %err, "failed to unwind conversion");
            }
        }
    }
}
