// Copyright 2025 Cowboy AI, LLC.

//! The `TicketingStore` persistence-context trait
//!
//! Every mutation that contends under concurrency is expressed as a
//! conditional update: stock commits check capacity and status changes
//! compare the current value, in one atomic step each. Callers never
//! read-then-write a contended field through this trait.

use crate::entity::{OrderId, PaymentId, ReservationId, TicketCategoryId, TicketId};
use crate::errors::TicketingResult;
use crate::identifiers::ExternalReference;
use crate::inventory::{InventoryCounter, StockCommit, TicketCategory};
use crate::money::Money;
use crate::order::{Order, OrderStatus};
use crate::payment::{Payment, PaymentStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::ticket::{ArtifactStatus, Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Transactional store backing the ticketing services
///
/// Contract notes:
/// - `try_commit_stock` applies "committed += qty iff it fits" atomically
///   with respect to concurrent callers on the same category.
/// - the `transition_*` methods are mechanical compare-and-set on the
///   status field: they return whether the row was in the expected state
///   and is now in the target state. Domain legality of the move is the
///   caller's business.
/// - `insert_tickets` skips rows whose (order, sequence) already exists
///   and returns only the rows actually inserted.
#[async_trait]
pub trait TicketingStore: Send + Sync {
    // --- ticket categories and stock ------------------------------------

    /// Insert a category and its zeroed inventory counter
    async fn insert_category(&self, category: TicketCategory) -> TicketingResult<()>;

    /// Load a category
    async fn category(&self, id: TicketCategoryId) -> TicketingResult<Option<TicketCategory>>;

    /// Load a category's inventory counter
    async fn counter(&self, id: TicketCategoryId) -> TicketingResult<Option<InventoryCounter>>;

    /// Conditionally commit stock: increment committed by `quantity` only
    /// if the result stays within capacity
    async fn try_commit_stock(
        &self,
        id: TicketCategoryId,
        quantity: u32,
    ) -> TicketingResult<StockCommit>;

    /// Return held stock to availability
    async fn release_stock(&self, id: TicketCategoryId, quantity: u32) -> TicketingResult<()>;

    /// Move held stock into the permanent sold state
    async fn finalize_stock(&self, id: TicketCategoryId, quantity: u32) -> TicketingResult<()>;

    /// Admin capacity adjustment; refused below committed stock
    async fn adjust_capacity(
        &self,
        id: TicketCategoryId,
        new_capacity: u32,
    ) -> TicketingResult<()>;

    /// Admin price adjustment; existing order lines keep their snapshots
    async fn set_category_price(
        &self,
        id: TicketCategoryId,
        new_price: Money,
    ) -> TicketingResult<()>;

    // --- reservations ----------------------------------------------------

    /// Insert a reservation row
    async fn insert_reservation(&self, reservation: Reservation) -> TicketingResult<()>;

    /// Load a reservation
    async fn reservation(&self, id: ReservationId) -> TicketingResult<Option<Reservation>>;

    /// CAS the reservation status; true iff the row was in `from`
    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> TicketingResult<bool>;

    /// ACTIVE reservations whose `expires_at` is before `now`
    async fn expired_active_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> TicketingResult<Vec<Reservation>>;

    // --- orders -----------------------------------------------------------

    /// Insert an order row; the invoice number must be unique
    async fn insert_order(&self, order: Order) -> TicketingResult<()>;

    /// Load an order
    async fn order(&self, id: OrderId) -> TicketingResult<Option<Order>>;

    /// Look an order up by its invoice number
    async fn order_by_invoice(&self, invoice: &str) -> TicketingResult<Option<Order>>;

    /// CAS the order status; sets `paid_at` when provided and the CAS wins
    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> TicketingResult<bool>;

    /// PENDING orders created before `cutoff`
    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> TicketingResult<Vec<Order>>;

    // --- payments ---------------------------------------------------------

    /// Insert a payment attempt
    async fn insert_payment(&self, payment: Payment) -> TicketingResult<()>;

    /// Look a payment up by its external reference (the idempotency key)
    async fn payment_by_external_reference(
        &self,
        reference: &ExternalReference,
    ) -> TicketingResult<Option<Payment>>;

    /// CAS the payment status; true iff the row was in `from`
    async fn transition_payment(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> TicketingResult<bool>;

    /// Store a raw callback payload against a payment for audit
    async fn attach_callback_payload(
        &self,
        id: PaymentId,
        payload: serde_json::Value,
    ) -> TicketingResult<()>;

    // --- tickets ----------------------------------------------------------

    /// Insert ticket rows, skipping any whose (order, sequence) already
    /// exists; returns the rows actually inserted
    async fn insert_tickets(&self, tickets: Vec<Ticket>) -> TicketingResult<Vec<Ticket>>;

    /// Load a ticket
    async fn ticket(&self, id: TicketId) -> TicketingResult<Option<Ticket>>;

    /// All tickets of an order, in sequence order
    async fn tickets_for_order(&self, order_id: OrderId) -> TicketingResult<Vec<Ticket>>;

    /// Record the artifact outcome for a ticket; true iff the ticket exists
    async fn set_ticket_artifact(
        &self,
        id: TicketId,
        status: ArtifactStatus,
        url: Option<String>,
    ) -> TicketingResult<bool>;

    /// CAS the ticket status; true iff the row was in `from`
    async fn transition_ticket(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    ) -> TicketingResult<bool>;
}
