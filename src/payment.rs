// Copyright 2025 Cowboy AI, LLC.

//! Payment records and the callback processor
//!
//! Gateway notifications arrive normalized as a [`PaymentNotice`]; the
//! processor never branches on gateway-specific field names. Admin manual
//! confirmations build the same notice and flow through the same
//! transition function, so there is exactly one idempotent state-change
//! path for payment outcomes.

use crate::entity::{OrderId, PaymentId};
use crate::errors::{TicketingError, TicketingResult};
use crate::identifiers::ExternalReference;
use crate::order::{Order, OrderStatus};
use crate::persistence::TicketingStore;
use crate::reservation::ReservationManager;
use crate::state_machine::{State, StatusTransitions};
use crate::ticket::TicketIssuance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How the buyer pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    /// Hosted gateway redirect flow
    Gateway,
    /// Manual bank transfer, confirmed by an admin
    ManualTransfer,
}

/// Lifecycle states of a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Awaiting the gateway's (or admin's) verdict
    Pending,
    /// Collected; refundable
    Success,
    /// Declined or aborted
    Failed,
    /// The gateway expired the intent
    Expired,
    /// Collected, then refunded
    Refunded,
}

impl PaymentStatus {
    /// Priority of a status for duplicate-callback arbitration: a repeat
    /// notice at the same or lower rank than the current status is a
    /// no-op, never a reprocess
    pub fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Failed | PaymentStatus::Expired => 1,
            PaymentStatus::Success => 2,
            PaymentStatus::Refunded => 3,
        }
    }
}

impl State for PaymentStatus {
    fn name(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded
        )
    }
}

impl StatusTransitions for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Pending, PaymentStatus::Success)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Pending, PaymentStatus::Expired)
                | (PaymentStatus::Success, PaymentStatus::Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            PaymentStatus::Pending => vec![
                PaymentStatus::Success,
                PaymentStatus::Failed,
                PaymentStatus::Expired,
            ],
            PaymentStatus::Success => vec![PaymentStatus::Refunded],
            _ => vec![],
        }
    }
}

/// One payment attempt for an order
///
/// A retry creates a new row; the external reference is the idempotency
/// key across callback deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Payment id
    pub id: PaymentId,
    /// Order this attempt settles
    pub order_id: OrderId,
    /// Channel the buyer chose
    pub channel: PaymentChannel,
    /// Gateway-assigned (or manual-flow) reference
    pub external_reference: ExternalReference,
    /// Lifecycle status
    pub status: PaymentStatus,
    /// Last raw callback payload, kept opaque for audit
    pub raw_callback: Option<serde_json::Value>,
    /// When the attempt was created
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Create a fresh PENDING attempt
    pub fn new(
        order_id: OrderId,
        channel: PaymentChannel,
        external_reference: ExternalReference,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            channel,
            external_reference,
            status: PaymentStatus::Pending,
            raw_callback: None,
            created_at: Utc::now(),
        }
    }
}

/// Terminal verdict carried by a normalized callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    /// Payment collected
    Success,
    /// Payment declined or aborted
    Failed,
    /// Intent expired at the gateway
    Expired,
    /// A previously collected payment was refunded
    Refunded,
}

impl CallbackStatus {
    /// The payment status this verdict drives toward
    pub fn target(&self) -> PaymentStatus {
        match self {
            CallbackStatus::Success => PaymentStatus::Success,
            CallbackStatus::Failed => PaymentStatus::Failed,
            CallbackStatus::Expired => PaymentStatus::Expired,
            CallbackStatus::Refunded => PaymentStatus::Refunded,
        }
    }
}

/// A gateway notification normalized at the API boundary
///
/// Whatever shape the gateway posts, it is reduced to this before it
/// reaches [`CallbackProcessor::handle_callback`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotice {
    /// The idempotency key
    pub external_reference: ExternalReference,
    /// Normalized verdict
    pub status: CallbackStatus,
    /// The original payload, stored untouched for audit
    pub raw: serde_json::Value,
}

impl PaymentNotice {
    /// Build the notice for an admin manually confirming a bank transfer
    ///
    /// Deliberately the same shape as a gateway webhook: the manual path
    /// must produce an identical resulting state.
    pub fn manual_confirmation(
        external_reference: ExternalReference,
        confirmed_by: impl Into<String>,
    ) -> Self {
        Self {
            external_reference,
            status: CallbackStatus::Success,
            raw: serde_json::json!({
                "source": "manual_confirmation",
                "confirmed_by": confirmed_by.into(),
            }),
        }
    }
}

/// How a callback delivery was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The transition was applied and all follow-up effects succeeded
    Processed,
    /// Payment and order transitioned, but ticket issuance failed and is
    /// left to out-of-band retry — never a reason to roll back the payment
    ProcessedIssuanceDeferred,
    /// Duplicate or lower-priority repeat; nothing was changed
    AlreadyProcessed,
    /// The notice contradicts an already-terminal state; nothing was
    /// changed and the conflict was logged for manual investigation
    Conflicting,
}

/// Payment callback processor service
///
/// Signature/authenticity verification of inbound webhooks happens before
/// a notice reaches this service.
#[derive(Clone)]
pub struct CallbackProcessor {
    store: Arc<dyn TicketingStore>,
    reservations: ReservationManager,
    issuance: TicketIssuance,
}

impl CallbackProcessor {
    /// Create a processor over the given collaborators
    pub fn new(
        store: Arc<dyn TicketingStore>,
        reservations: ReservationManager,
        issuance: TicketIssuance,
    ) -> Self {
        Self {
            store,
            reservations,
            issuance,
        }
    }

    /// Idempotently apply one normalized payment notice
    ///
    /// The same terminal notice delivered twice produces the same end
    /// state with no double side effects: no second ticket set, no second
    /// artifact generation, no double stock release.
    pub async fn handle_callback(&self, notice: PaymentNotice) -> TicketingResult<CallbackOutcome> {
        let payment = self
            .store
            .payment_by_external_reference(&notice.external_reference)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "payment",
                id: notice.external_reference.to_string(),
            })?;

        // Audit trail first, even for duplicates.
        self.store
            .attach_callback_payload(payment.id, notice.raw.clone())
            .await?;

        let target = notice.status.target();
        if payment.status == target {
            info!(
                external_reference = %notice.external_reference,
                status = target.name(),
                "duplicate callback, already applied"
            );
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        if !payment.status.can_transition_to(&target) {
            if target.rank() <= payment.status.rank() {
                // Late, lower-priority delivery (e.g. an expiry notice
                // arriving after success); acknowledged and dropped.
                info!(
                    external_reference = %notice.external_reference,
                    current = payment.status.name(),
                    incoming = target.name(),
                    "stale callback ignored"
                );
                return Ok(CallbackOutcome::AlreadyProcessed);
            }
            // Never silently drop a higher-priority notice: surface it.
            error!(
                external_reference = %notice.external_reference,
                current = payment.status.name(),
                incoming = target.name(),
                "conflicting callback, manual investigation required"
            );
            return Ok(CallbackOutcome::Conflicting);
        }

        match notice.status {
            CallbackStatus::Success => self.apply_success(&payment).await,
            CallbackStatus::Failed | CallbackStatus::Expired => {
                self.apply_failure(&payment, target).await
            }
            CallbackStatus::Refunded => self.apply_refund(&payment).await,
        }
    }

    async fn apply_success(&self, payment: &Payment) -> TicketingResult<CallbackOutcome> {
        let won = self
            .store
            .transition_payment(payment.id, PaymentStatus::Pending, PaymentStatus::Success)
            .await?;
        if !won {
            return self
                .resolve_lost_payment_race(payment, PaymentStatus::Success)
                .await;
        }

        let order = self.load_order(payment.order_id).await?;
        let paid_at = Utc::now();
        let order_won = self
            .store
            .transition_order(
                order.id,
                OrderStatus::Pending,
                OrderStatus::Success,
                Some(paid_at),
            )
            .await?;

        if order_won {
            self.reservations
                .finalize_converted(&order.reservation_ids)
                .await?;
            info!(
                order = %order.id,
                invoice = %order.invoice,
                payment = %payment.id,
                "order paid"
            );
        } else {
            let current = self.load_order(order.id).await?;
            if current.status != OrderStatus::Success {
                error!(
                    order = %order.id,
                    status = current.status.name(),
                    "payment succeeded but order left PENDING earlier; not reprocessed"
                );
                return Ok(CallbackOutcome::Conflicting);
            }
            // Another success delivery beat us to the order row; issuance
            // below is idempotent, so falling through is safe.
        }

        match self.issuance.issue_tickets_for_order(order.id).await {
            Ok(report) => {
                if report.artifacts_failed > 0 {
                    warn!(
                        order = %order.id,
                        failed = report.artifacts_failed,
                        "some ticket artifacts failed, eligible for regeneration"
                    );
                }
                Ok(CallbackOutcome::Processed)
            }
            Err(err) => {
                // Money has moved; remediation is operational retry of
                // issuance, never reversing the order.
                error!(order = %order.id, %err, "ticket issuance failed after payment success");
                Ok(CallbackOutcome::ProcessedIssuanceDeferred)
            }
        }
    }

    async fn apply_failure(
        &self,
        payment: &Payment,
        target: PaymentStatus,
    ) -> TicketingResult<CallbackOutcome> {
        let won = self
            .store
            .transition_payment(payment.id, PaymentStatus::Pending, target)
            .await?;
        if !won {
            return self.resolve_lost_payment_race(payment, target).await;
        }

        let order = self.load_order(payment.order_id).await?;
        let order_won = self
            .store
            .transition_order(order.id, OrderStatus::Pending, OrderStatus::Failed, None)
            .await?;
        if order_won {
            let released = self
                .reservations
                .release_converted(&order.reservation_ids)
                .await?;
            info!(
                order = %order.id,
                payment = %payment.id,
                status = target.name(),
                released,
                "order failed, stock returned"
            );
        }
        Ok(CallbackOutcome::Processed)
    }

    async fn apply_refund(&self, payment: &Payment) -> TicketingResult<CallbackOutcome> {
        let won = self
            .store
            .transition_payment(payment.id, PaymentStatus::Success, PaymentStatus::Refunded)
            .await?;
        if !won {
            return self
                .resolve_lost_payment_race(payment, PaymentStatus::Refunded)
                .await;
        }

        let order = self.load_order(payment.order_id).await?;
        let order_won = self
            .store
            .transition_order(order.id, OrderStatus::Success, OrderStatus::Refunded, None)
            .await?;
        if !order_won {
            let current = self.load_order(order.id).await?;
            if current.status != OrderStatus::Refunded {
                error!(
                    order = %order.id,
                    status = current.status.name(),
                    "payment refunded but order is not in a refundable state, manual investigation required"
                );
                return Ok(CallbackOutcome::Conflicting);
            }
        }
        info!(order = %order.id, payment = %payment.id, "order refunded");
        Ok(CallbackOutcome::Processed)
    }

    /// Arbitrate a payment CAS lost to a concurrent delivery
    ///
    /// The pre-check in `handle_callback` reads the status before the CAS,
    /// so two conflicting verdicts can both pass it. A repeat of the same
    /// (or a lower-priority) verdict is a plain duplicate; a higher-priority
    /// verdict that lost the race is surfaced loudly, never acknowledged as
    /// processed.
    async fn resolve_lost_payment_race(
        &self,
        payment: &Payment,
        target: PaymentStatus,
    ) -> TicketingResult<CallbackOutcome> {
        let current = self
            .store
            .payment_by_external_reference(&payment.external_reference)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "payment",
                id: payment.external_reference.to_string(),
            })?;

        if target.rank() <= current.status.rank() {
            info!(
                payment = %payment.id,
                current = current.status.name(),
                incoming = target.name(),
                "callback already settled by a concurrent delivery"
            );
            return Ok(CallbackOutcome::AlreadyProcessed);
        }
        error!(
            payment = %payment.id,
            current = current.status.name(),
            incoming = target.name(),
            "callback lost its status race to a contradictory verdict, manual investigation required"
        );
        Ok(CallbackOutcome::Conflicting)
    }

    async fn load_order(&self, order_id: OrderId) -> TicketingResult<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "order",
                id: order_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TicketingConfig;
    use crate::entity::{ReservationId, TicketCategoryId, TicketId};
    use crate::gateway::MockArtifactGenerator;
    use crate::identifiers::{InvoiceNumber, SessionToken};
    use crate::inventory::{InventoryCounter, InventoryLedger, StockCommit, TicketCategory};
    use crate::money::{Currency, Money};
    use crate::order::{BuyerIdentity, OrderLine};
    use crate::persistence::InMemoryTicketingStore;
    use crate::reservation::{Reservation, ReservationStatus};
    use crate::ticket::{ArtifactStatus, Ticket, TicketStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use test_case::test_case;

    #[test_case(PaymentStatus::Pending, PaymentStatus::Success, true; "pending to success")]
    #[test_case(PaymentStatus::Pending, PaymentStatus::Failed, true; "pending to failed")]
    #[test_case(PaymentStatus::Pending, PaymentStatus::Expired, true; "pending to expired")]
    #[test_case(PaymentStatus::Success, PaymentStatus::Refunded, true; "success to refunded")]
    #[test_case(PaymentStatus::Pending, PaymentStatus::Refunded, false; "no refund before success")]
    #[test_case(PaymentStatus::Failed, PaymentStatus::Success, false; "failed is sealed")]
    #[test_case(PaymentStatus::Expired, PaymentStatus::Success, false; "expired is sealed")]
    fn test_payment_transition_table(from: PaymentStatus, to: PaymentStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_rank_ordering() {
        assert!(PaymentStatus::Pending.rank() < PaymentStatus::Failed.rank());
        assert!(PaymentStatus::Failed.rank() < PaymentStatus::Success.rank());
        assert!(PaymentStatus::Success.rank() < PaymentStatus::Refunded.rank());
        assert_eq!(PaymentStatus::Failed.rank(), PaymentStatus::Expired.rank());
    }

    #[test]
    fn test_manual_confirmation_is_a_success_notice() {
        let reference = ExternalReference::new("MANUAL-INV-1");
        let notice = PaymentNotice::manual_confirmation(reference.clone(), "ops@venue");
        assert_eq!(notice.status, CallbackStatus::Success);
        assert_eq!(notice.external_reference, reference);
        assert_eq!(notice.raw["source"], "manual_confirmation");
    }

    /// Store wrapper that lets a competing FAILED verdict win the payment
    /// status race at the exact moment a SUCCESS delivery tries its CAS,
    /// after both deliveries passed the pre-check on a PENDING row.
    struct ContestedStore {
        inner: Arc<dyn TicketingStore>,
        contested: AtomicBool,
    }

    #[async_trait]
    impl TicketingStore for ContestedStore {
        async fn insert_category(&self, category: TicketCategory) -> TicketingResult<()> {
            self.inner.insert_category(category).await
        }

        async fn category(
            &self,
            id: TicketCategoryId,
        ) -> TicketingResult<Option<TicketCategory>> {
            self.inner.category(id).await
        }

        async fn counter(
            &self,
            id: TicketCategoryId,
        ) -> TicketingResult<Option<InventoryCounter>> {
            self.inner.counter(id).await
        }

        async fn try_commit_stock(
            &self,
            id: TicketCategoryId,
            quantity: u32,
        ) -> TicketingResult<StockCommit> {
            self.inner.try_commit_stock(id, quantity).await
        }

        async fn release_stock(
            &self,
            id: TicketCategoryId,
            quantity: u32,
        ) -> TicketingResult<()> {
            self.inner.release_stock(id, quantity).await
        }

        async fn finalize_stock(
            &self,
            id: TicketCategoryId,
            quantity: u32,
        ) -> TicketingResult<()> {
            self.inner.finalize_stock(id, quantity).await
        }

        async fn adjust_capacity(
            &self,
            id: TicketCategoryId,
            new_capacity: u32,
        ) -> TicketingResult<()> {
            self.inner.adjust_capacity(id, new_capacity).await
        }

        async fn set_category_price(
            &self,
            id: TicketCategoryId,
            new_price: Money,
        ) -> TicketingResult<()> {
            self.inner.set_category_price(id, new_price).await
        }

        async fn insert_reservation(&self, reservation: Reservation) -> TicketingResult<()> {
            self.inner.insert_reservation(reservation).await
        }

        async fn reservation(
            &self,
            id: ReservationId,
        ) -> TicketingResult<Option<Reservation>> {
            self.inner.reservation(id).await
        }

        async fn transition_reservation(
            &self,
            id: ReservationId,
            from: ReservationStatus,
            to: ReservationStatus,
        ) -> TicketingResult<bool> {
            self.inner.transition_reservation(id, from, to).await
        }

        async fn expired_active_reservations(
            &self,
            now: DateTime<Utc>,
        ) -> TicketingResult<Vec<Reservation>> {
            self.inner.expired_active_reservations(now).await
        }

        async fn insert_order(&self, order: Order) -> TicketingResult<()> {
            self.inner.insert_order(order).await
        }

        async fn order(&self, id: OrderId) -> TicketingResult<Option<Order>> {
            self.inner.order(id).await
        }

        async fn order_by_invoice(&self, invoice: &str) -> TicketingResult<Option<Order>> {
            self.inner.order_by_invoice(invoice).await
        }

        async fn transition_order(
            &self,
            id: OrderId,
            from: OrderStatus,
            to: OrderStatus,
            paid_at: Option<DateTime<Utc>>,
        ) -> TicketingResult<bool> {
            self.inner.transition_order(id, from, to, paid_at).await
        }

        async fn stale_pending_orders(
            &self,
            cutoff: DateTime<Utc>,
        ) -> TicketingResult<Vec<Order>> {
            self.inner.stale_pending_orders(cutoff).await
        }

        async fn insert_payment(&self, payment: Payment) -> TicketingResult<()> {
            self.inner.insert_payment(payment).await
        }

        async fn payment_by_external_reference(
            &self,
            reference: &ExternalReference,
        ) -> TicketingResult<Option<Payment>> {
            self.inner.payment_by_external_reference(reference).await
        }

        async fn transition_payment(
            &self,
            id: PaymentId,
            from: PaymentStatus,
            to: PaymentStatus,
        ) -> TicketingResult<bool> {
            if to == PaymentStatus::Success && self.contested.swap(false, Ordering::SeqCst) {
                // The concurrent FAILED delivery lands first.
                self.inner
                    .transition_payment(id, PaymentStatus::Pending, PaymentStatus::Failed)
                    .await?;
            }
            self.inner.transition_payment(id, from, to).await
        }

        async fn attach_callback_payload(
            &self,
            id: PaymentId,
            payload: serde_json::Value,
        ) -> TicketingResult<()> {
            self.inner.attach_callback_payload(id, payload).await
        }

        async fn insert_tickets(&self, tickets: Vec<Ticket>) -> TicketingResult<Vec<Ticket>> {
            self.inner.insert_tickets(tickets).await
        }

        async fn ticket(&self, id: TicketId) -> TicketingResult<Option<Ticket>> {
            self.inner.ticket(id).await
        }

        async fn tickets_for_order(&self, order_id: OrderId) -> TicketingResult<Vec<Ticket>> {
            self.inner.tickets_for_order(order_id).await
        }

        async fn set_ticket_artifact(
            &self,
            id: TicketId,
            status: ArtifactStatus,
            url: Option<String>,
        ) -> TicketingResult<bool> {
            self.inner.set_ticket_artifact(id, status, url).await
        }

        async fn transition_ticket(
            &self,
            id: TicketId,
            from: TicketStatus,
            to: TicketStatus,
        ) -> TicketingResult<bool> {
            self.inner.transition_ticket(id, from, to).await
        }
    }

    #[tokio::test]
    async fn test_success_losing_the_status_race_is_flagged_not_swallowed() {
        let store: Arc<dyn TicketingStore> = Arc::new(ContestedStore {
            inner: Arc::new(InMemoryTicketingStore::new()),
            contested: AtomicBool::new(true),
        });
        let config = TicketingConfig::default();
        let ledger = InventoryLedger::new(store.clone());
        let reservations = ReservationManager::new(store.clone(), ledger, config);
        let issuance = TicketIssuance::new(store.clone(), Arc::new(MockArtifactGenerator::new()));
        let processor = CallbackProcessor::new(store.clone(), reservations, issuance);

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            invoice: InvoiceNumber::generate(now),
            buyer: BuyerIdentity::Guest {
                session: SessionToken::new("s-1"),
                email: "guest@example.com".to_string(),
            },
            lines: vec![OrderLine {
                category_id: TicketCategoryId::new(),
                quantity: 1,
                unit_price: Money::new(100_000, Currency::new("IDR")),
            }],
            amount: Money::new(100_000, Currency::new("IDR")),
            status: OrderStatus::Pending,
            reservation_ids: vec![],
            created_at: now,
            paid_at: None,
        };
        let order_id = order.id;
        store.insert_order(order).await.unwrap();

        let reference = ExternalReference::new("PAY-RACE-1");
        store
            .insert_payment(Payment::new(order_id, PaymentChannel::Gateway, reference.clone()))
            .await
            .unwrap();

        let outcome = processor
            .handle_callback(PaymentNotice {
                external_reference: reference.clone(),
                status: CallbackStatus::Success,
                raw: serde_json::json!({"transaction_status": "settlement"}),
            })
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Conflicting);

        // The lost SUCCESS took no side effects: the FAILED winner owns
        // the payment row and no tickets exist.
        let payment = store
            .payment_by_external_reference(&reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(store.tickets_for_order(order_id).await.unwrap().is_empty());
    }
}
