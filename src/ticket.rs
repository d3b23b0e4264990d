// Copyright 2025 Cowboy AI, LLC.

//! Ticket issuance
//!
//! Materializes ticket rows once an order is paid and drives artifact
//! generation (QR payload, rendered image) per ticket. Issuance is safe to
//! invoke repeatedly: the (order, sequence) uniqueness in the persistence
//! context makes ticket creation exactly-once, and only tickets whose
//! artifact is still PENDING or FAILED are sent to the generator again.

use crate::entity::{OrderId, TicketCategoryId, TicketId};
use crate::errors::{TicketingError, TicketingResult};
use crate::gateway::{ArtifactGenerator, ArtifactRequest};
use crate::order::{BuyerIdentity, Order, OrderStatus};
use crate::persistence::TicketingStore;
use crate::state_machine::{State, StatusTransitions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle states of an issued ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Created, artifact not yet generated
    Pending,
    /// Valid for entry
    Active,
    /// Scanned at the venue
    Used,
    /// Invalidated by an administrative action
    Cancelled,
}

impl State for TicketStatus {
    fn name(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Used | TicketStatus::Cancelled)
    }
}

impl StatusTransitions for TicketStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (TicketStatus::Pending, TicketStatus::Active)
                | (TicketStatus::Pending, TicketStatus::Cancelled)
                | (TicketStatus::Active, TicketStatus::Used)
                | (TicketStatus::Active, TicketStatus::Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            TicketStatus::Pending => vec![TicketStatus::Active, TicketStatus::Cancelled],
            TicketStatus::Active => vec![TicketStatus::Used, TicketStatus::Cancelled],
            _ => vec![],
        }
    }
}

/// Artifact generation state, independent of the ticket's own lifecycle
///
/// A FAILED artifact never blocks the ticket's existence; it only marks it
/// eligible for regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    /// Not yet generated
    Pending,
    /// Rendered and hosted
    Generated,
    /// Last generation attempt failed; retryable
    Failed,
}

impl State for ArtifactStatus {
    fn name(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "PENDING",
            ArtifactStatus::Generated => "GENERATED",
            ArtifactStatus::Failed => "FAILED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ArtifactStatus::Generated)
    }
}

impl StatusTransitions for ArtifactStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (ArtifactStatus::Pending, ArtifactStatus::Generated)
                | (ArtifactStatus::Pending, ArtifactStatus::Failed)
                | (ArtifactStatus::Failed, ArtifactStatus::Generated)
                | (ArtifactStatus::Failed, ArtifactStatus::Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            ArtifactStatus::Pending => vec![ArtifactStatus::Generated, ArtifactStatus::Failed],
            ArtifactStatus::Failed => vec![ArtifactStatus::Generated, ArtifactStatus::Failed],
            ArtifactStatus::Generated => vec![],
        }
    }
}

/// Who a ticket admits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderInfo {
    /// Display name on the ticket
    pub name: String,
    /// Contact email, when known
    pub email: Option<String>,
}

impl HolderInfo {
    /// Derive holder info from the buyer
    ///
    /// Guest buyers carry an email; authenticated buyers are referenced by
    /// user id and their profile fills in contact details downstream.
    pub fn from_buyer(buyer: &BuyerIdentity) -> Self {
        match buyer {
            BuyerIdentity::User { user_id } => Self {
                name: format!("user:{user_id}"),
                email: None,
            },
            BuyerIdentity::Guest { email, .. } => Self {
                name: email.clone(),
                email: Some(email.clone()),
            },
        }
    }
}

/// An issued ticket
///
/// Uniqueness on (order, sequence) is what makes issuance exactly-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id
    pub id: TicketId,
    /// Order the ticket was issued for
    pub order_id: OrderId,
    /// Category the ticket admits to
    pub category_id: TicketCategoryId,
    /// Position within the order (0-based across all lines)
    pub sequence: u32,
    /// Who the ticket admits
    pub holder: HolderInfo,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Artifact generation state
    pub artifact_status: ArtifactStatus,
    /// Hosted artifact location once generated
    pub artifact_url: Option<String>,
    /// When the ticket row was created
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    fn new(
        order_id: OrderId,
        category_id: TicketCategoryId,
        sequence: u32,
        holder: HolderInfo,
    ) -> Self {
        Self {
            id: TicketId::new(),
            order_id,
            category_id,
            sequence,
            holder,
            status: TicketStatus::Pending,
            artifact_status: ArtifactStatus::Pending,
            artifact_url: None,
            created_at: Utc::now(),
        }
    }
}

/// Counters for one issuance pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IssuanceReport {
    /// Ticket rows newly created by this pass
    pub created: u32,
    /// Artifacts generated by this pass
    pub artifacts_generated: u32,
    /// Artifact attempts that failed (retryable)
    pub artifacts_failed: u32,
}

/// Ticket issuance service
#[derive(Clone)]
pub struct TicketIssuance {
    store: Arc<dyn TicketingStore>,
    artifacts: Arc<dyn ArtifactGenerator>,
}

impl TicketIssuance {
    /// Create an issuance service over the given collaborators
    pub fn new(store: Arc<dyn TicketingStore>, artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        Self { store, artifacts }
    }

    /// Issue the full ticket set for a paid order
    ///
    /// Re-invocation (from a repeated callback or an admin regenerate)
    /// creates no duplicate tickets and leaves GENERATED artifacts alone;
    /// only PENDING/FAILED artifacts are attempted again.
    pub async fn issue_tickets_for_order(&self, order_id: OrderId) -> TicketingResult<IssuanceReport> {
        let order = self.load_order(order_id).await?;
        if order.status != OrderStatus::Success {
            return Err(TicketingError::OrderNotInStatus {
                id: order_id.to_string(),
                status: order.status.name().to_string(),
                expected: OrderStatus::Success.name().to_string(),
            });
        }

        let holder = HolderInfo::from_buyer(&order.buyer);
        let mut desired = Vec::with_capacity(order.ticket_count() as usize);
        let mut sequence = 0;
        for line in &order.lines {
            for _ in 0..line.quantity {
                desired.push(Ticket::new(order_id, line.category_id, sequence, holder.clone()));
                sequence += 1;
            }
        }

        let inserted = self.store.insert_tickets(desired).await?;
        let mut report = IssuanceReport {
            created: inserted.len() as u32,
            ..IssuanceReport::default()
        };
        if report.created > 0 {
            info!(order = %order_id, created = report.created, "issued tickets");
        }

        for ticket in self.store.tickets_for_order(order_id).await? {
            if ticket.artifact_status == ArtifactStatus::Generated {
                continue;
            }
            self.generate_artifact(&ticket, &mut report).await?;
        }

        Ok(report)
    }

    /// Admin entry point: retry artifact generation for an order's tickets
    ///
    /// Same function as issuance, same idempotency.
    pub async fn regenerate_artifacts(&self, order_id: OrderId) -> TicketingResult<IssuanceReport> {
        self.issue_tickets_for_order(order_id).await
    }

    /// Mark a ticket as used at the venue gate
    ///
    /// A second scan of the same ticket is refused.
    pub async fn mark_used(&self, ticket_id: TicketId) -> TicketingResult<()> {
        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound {
                entity_type: "ticket",
                id: ticket_id.to_string(),
            })?;

        let won = self
            .store
            .transition_ticket(ticket_id, TicketStatus::Active, TicketStatus::Used)
            .await?;
        if !won {
            return Err(TicketingError::TicketNotInStatus {
                id: ticket_id.to_string(),
                status: ticket.status.name().to_string(),
                expected: TicketStatus::Active.name().to_string(),
            });
        }
        info!(ticket = %ticket_id, "ticket used");
        Ok(())
    }

    async fn generate_artifact(
        &self,
        ticket: &Ticket,
        report: &mut IssuanceReport,
    ) -> TicketingResult<()> {
        let request = ArtifactRequest {
            ticket: ticket.id,
            order: ticket.order_id,
            category: ticket.category_id,
            sequence: ticket.sequence,
            holder: ticket.holder.clone(),
        };

        match self.artifacts.generate(request).await {
            Ok(handle) => {
                self.store
                    .set_ticket_artifact(ticket.id, ArtifactStatus::Generated, Some(handle.url))
                    .await?;
                self.store
                    .transition_ticket(ticket.id, TicketStatus::Pending, TicketStatus::Active)
                    .await?;
                report.artifacts_generated += 1;
            }
            Err(err) => {
                // Retryable side effect, never fatal for the order.
                self.store
                    .set_ticket_artifact(ticket.id, ArtifactStatus::Failed, None)
                    .await?;
                warn!(ticket = %ticket.id, %err, "artifact generation failed");
                report.artifacts_failed += 1;
            }
        }
        Ok(())
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
