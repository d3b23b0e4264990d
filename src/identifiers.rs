// Copyright 2025 Cowboy AI, LLC.

//! Human-referenceable identifier types
//!
//! Unlike the UUID-backed [`EntityId`](crate::EntityId)s, these identifiers
//! cross system boundaries: invoice numbers appear on receipts and gateway
//! references, session tokens identify anonymous buyers, and external
//! references are the idempotency keys handed out by payment gateways.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique, human-referenceable invoice number assigned to every order
///
/// Format: `INV-YYYYMMDD-XXXXXXXX` where the suffix is drawn from a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// Generate a fresh invoice number for the given issue date
    pub fn generate(issued_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "INV-{}-{}",
            issued_at.format("%Y%m%d"),
            &suffix[..8].to_uppercase()
        ))
    }

    /// View as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque session token identifying an anonymous (guest) buyer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap an existing session token value
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// View as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference assigned by the payment gateway to a payment attempt
///
/// This is the idempotency key of the callback contract: a terminal
/// notification for the same reference is applied at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalReference(String);

impl ExternalReference {
    /// Wrap a reference received from a gateway
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Synthesize a reference for a manual bank-transfer attempt,
    /// which never touches a gateway
    pub fn for_manual(invoice: &InvoiceNumber) -> Self {
        Self(format!("MANUAL-{invoice}"))
    }

    /// View as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
