// Copyright 2025 Cowboy AI, LLC.

//! In-memory persistence context
//!
//! Every mutation takes the single write lock, which is what makes each
//! store primitive atomic: a conditional stock commit or a status CAS can
//! never interleave with another writer. Tables are `IndexMap`s so sweep
//! scans iterate in insertion order deterministically.

use crate::entity::{OrderId, PaymentId, ReservationId, TicketCategoryId, TicketId};
use crate::errors::{TicketingError, TicketingResult};
use crate::identifiers::ExternalReference;
use crate::inventory::{InventoryCounter, StockCommit, TicketCategory};
use crate::money::Money;
use crate::order::{Order, OrderStatus};
use crate::payment::{Payment, PaymentStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::ticket::{ArtifactStatus, Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::TicketingStore;

#[derive(Debug, Default)]
struct Tables {
    categories: IndexMap<TicketCategoryId, TicketCategory>,
    counters: IndexMap<TicketCategoryId, InventoryCounter>,
    reservations: IndexMap<ReservationId, Reservation>,
    orders: IndexMap<OrderId, Order>,
    payments: IndexMap<PaymentId, Payment>,
    tickets: IndexMap<TicketId, Ticket>,
    // Uniqueness index enforcing exactly-once ticket creation per order line.
    issued: HashSet<(OrderId, u32)>,
}

/// In-memory [`TicketingStore`], the default test double and the
/// single-process deployment store
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryTicketingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn category_not_found(id: TicketCategoryId) -> TicketingError {
    TicketingError::NotFound {
        entity_type: "ticket category",
        id: id.to_string(),
    }
}

#[async_trait]
impl TicketingStore for InMemoryTicketingStore {
    async fn insert_category(&self, category: TicketCategory) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        if tables.categories.contains_key(&category.id) {
            return Err(TicketingError::Invariant(format!(
                "duplicate ticket category {}",
                category.id
            )));
        }
        let counter = InventoryCounter::new(&category);
        tables.counters.insert(category.id, counter);
        tables.categories.insert(category.id, category);
        Ok(())
    }

    async fn category(&self, id: TicketCategoryId) -> TicketingResult<Option<TicketCategory>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn counter(&self, id: TicketCategoryId) -> TicketingResult<Option<InventoryCounter>> {
        Ok(self.tables.read().await.counters.get(&id).cloned())
    }

    async fn try_commit_stock(
        &self,
        id: TicketCategoryId,
        quantity: u32,
    ) -> TicketingResult<StockCommit> {
        let mut tables = self.tables.write().await;
        let counter = tables
            .counters
            .get_mut(&id)
            .ok_or_else(|| category_not_found(id))?;
        counter.check()?;
        if counter.try_commit(quantity) {
            Ok(StockCommit::Committed)
        } else {
            Ok(StockCommit::Insufficient {
                remaining: counter.remaining(),
            })
        }
    }

    async fn release_stock(&self, id: TicketCategoryId, quantity: u32) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        let counter = tables
            .counters
            .get_mut(&id)
            .ok_or_else(|| category_not_found(id))?;
        counter.release(quantity)
    }

    async fn finalize_stock(&self, id: TicketCategoryId, quantity: u32) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        let counter = tables
            .counters
            .get_mut(&id)
            .ok_or_else(|| category_not_found(id))?;
        counter.finalize(quantity)
    }

    async fn adjust_capacity(
        &self,
        id: TicketCategoryId,
        new_capacity: u32,
    ) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        let counter = tables
            .counters
            .get_mut(&id)
            .ok_or_else(|| category_not_found(id))?;
        if new_capacity < counter.committed {
            return Err(TicketingError::InvalidCapacity {
                requested: new_capacity,
                committed: counter.committed,
            });
        }
        counter.capacity = new_capacity;
        if let Some(category) = tables.categories.get_mut(&id) {
            category.capacity = new_capacity;
        }
        Ok(())
    }

    async fn set_category_price(
        &self,
        id: TicketCategoryId,
        new_price: Money,
    ) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        let category = tables
            .categories
            .get_mut(&id)
            .ok_or_else(|| category_not_found(id))?;
        category.unit_price = new_price;
        Ok(())
    }

    async fn insert_reservation(&self, reservation: Reservation) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        if tables.reservations.contains_key(&reservation.id) {
            return Err(TicketingError::Invariant(format!(
                "duplicate reservation {}",
                reservation.id
            )));
        }
        tables.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> TicketingResult<Option<Reservation>> {
        Ok(self.tables.read().await.reservations.get(&id).cloned())
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> TicketingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.reservations.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expired_active_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> TicketingResult<Vec<Reservation>> {
        Ok(self
            .tables
            .read()
            .await
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: Order) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(TicketingError::Invariant(format!(
                "duplicate order {}",
                order.id
            )));
        }
        if tables
            .orders
            .values()
            .any(|existing| existing.invoice == order.invoice)
        {
            return Err(TicketingError::Invariant(format!(
                "duplicate invoice number {}",
                order.invoice
            )));
        }
        tables.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, id: OrderId) -> TicketingResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn order_by_invoice(&self, invoice: &str) -> TicketingResult<Option<Order>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .find(|order| order.invoice.as_str() == invoice)
            .cloned())
    }

    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> TicketingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                if paid_at.is_some() {
                    row.paid_at = paid_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> TicketingResult<Vec<Order>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_payment(&self, payment: Payment) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        if tables.payments.contains_key(&payment.id) {
            return Err(TicketingError::Invariant(format!(
                "duplicate payment {}",
                payment.id
            )));
        }
        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn payment_by_external_reference(
        &self,
        reference: &ExternalReference,
    ) -> TicketingResult<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .values()
            .rev()
            .find(|p| &p.external_reference == reference)
            .cloned())
    }

    async fn transition_payment(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> TicketingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.payments.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_callback_payload(
        &self,
        id: PaymentId,
        payload: serde_json::Value,
    ) -> TicketingResult<()> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "payment",
                id: id.to_string(),
            })?;
        payment.raw_callback = Some(payload);
        Ok(())
    }

    async fn insert_tickets(&self, tickets: Vec<Ticket>) -> TicketingResult<Vec<Ticket>> {
        let mut tables = self.tables.write().await;
        let mut inserted = Vec::new();
        for ticket in tickets {
            let key = (ticket.order_id, ticket.sequence);
            if !tables.issued.insert(key) {
                continue;
            }
            tables.tickets.insert(ticket.id, ticket.clone());
            inserted.push(ticket);
        }
        Ok(inserted)
    }

    async fn ticket(&self, id: TicketId) -> TicketingResult<Option<Ticket>> {
        Ok(self.tables.read().await.tickets.get(&id).cloned())
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> TicketingResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tables
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.sequence);
        Ok(tickets)
    }

    async fn set_ticket_artifact(
        &self,
        id: TicketId,
        status: ArtifactStatus,
        url: Option<String>,
    ) -> TicketingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.tickets.get_mut(&id) {
            Some(ticket) => {
                ticket.artifact_status = status;
                ticket.artifact_url = url;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition_ticket(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    ) -> TicketingResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.tickets.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
