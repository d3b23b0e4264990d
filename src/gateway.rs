// Copyright 2025 Cowboy AI, LLC.

//! External collaborator interfaces
//!
//! The payment gateway and the QR/email artifact generator are consumed as
//! black boxes behind these traits. Implementations are injected by the
//! process entry point; the core never reaches for a global client.

use crate::entity::{OrderId, TicketCategoryId, TicketId};
use crate::errors::TicketingError;
use crate::identifiers::{ExternalReference, InvoiceNumber};
use crate::money::Money;
use crate::ticket::HolderInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a payment gateway collaborator
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway could not be reached
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the intent (bad amount, closed merchant, ...)
    #[error("gateway rejected intent: {0}")]
    Rejected(String),
}

impl From<GatewayError> for TicketingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(reason) => TicketingError::GatewayUnavailable(reason),
            GatewayError::Rejected(reason) => TicketingError::GatewayRejected(reason),
        }
    }
}

/// Request for a payment intent, keyed by the order's invoice number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Invoice the payment settles
    pub invoice: InvoiceNumber,
    /// Amount to collect
    pub amount: Money,
    /// Buyer email, when known (guest checkouts always carry one)
    pub customer_email: Option<String>,
}

/// A payment intent created by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Where to send the buyer to complete payment
    pub redirect_url: String,
    /// Gateway-assigned reference; the idempotency key for callbacks
    pub external_reference: ExternalReference,
}

/// Payment gateway collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for an order
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError>;
}

/// Errors surfaced by the artifact generator collaborator
#[derive(Debug, Clone, Error)]
#[error("artifact generation failed: {0}")]
pub struct ArtifactError(pub String);

impl From<ArtifactError> for TicketingError {
    fn from(err: ArtifactError) -> Self {
        TicketingError::ArtifactGeneration(err.0)
    }
}

/// Request to render a ticket artifact (QR payload and image)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRequest {
    /// Ticket the artifact belongs to
    pub ticket: TicketId,
    /// Order the ticket was issued for
    pub order: OrderId,
    /// Ticket category, for event metadata lookup by the renderer
    pub category: TicketCategoryId,
    /// Position of the ticket within the order
    pub sequence: u32,
    /// Who the ticket admits
    pub holder: HolderInfo,
}

/// A rendered ticket artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Where the rendered artifact is hosted
    pub url: String,
}

/// QR/email artifact generator collaborator
///
/// Fire-and-forget from the order's perspective: failures are logged and
/// retried through [`TicketIssuance::regenerate_artifacts`](crate::TicketIssuance::regenerate_artifacts),
/// never propagated as order failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Render the artifact for one ticket
    async fn generate(&self, request: ArtifactRequest) -> Result<ArtifactHandle, ArtifactError>;
}
