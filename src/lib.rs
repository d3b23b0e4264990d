//! # CIM Ticketing
//!
//! Inventory reservation and order fulfillment for concert ticketing.
//!
//! The crate tracks sellable stock per ticket category and drives the full
//! purchase lifecycle over it:
//! - **Inventory Ledger**: capacity vs committed stock, with conditional
//!   commits so concurrent buyers can never oversell a category
//! - **Reservations**: short-lived holds with a TTL and a background sweep
//! - **Orders**: all-or-nothing creation from reservations, with price
//!   snapshots frozen at creation
//! - **Payments**: gateway and manual-transfer checkout, idempotent
//!   callback processing keyed on the external reference
//! - **Tickets**: exactly-once issuance per paid order, with retryable
//!   artifact generation
//!
//! ## Design Principles
//!
//! 1. **Conditional Updates**: every contended mutation is a single
//!    compare-and-set at the persistence layer; services never
//!    read-then-write a contended field
//! 2. **Races Resolve at the Row**: convert-vs-expire and
//!    callback-vs-callback are decided by whoever wins the status CAS,
//!    and only the winner takes side effects
//! 3. **Explicit Wiring**: services receive their store, gateway, and
//!    clock inputs from the entry point; no globals
//! 4. **Typed Errors**: business refusals, transient faults, and
//!    invariant breaches are distinct kinds with distinct handling

#![warn(missing_docs)]

mod config;
mod entity;
mod errors;
mod gateway;
mod identifiers;
mod inventory;
mod money;
mod order;
mod payment;
pub mod persistence;
mod reservation;
mod services;
mod state_machine;
mod sweeper;
mod ticket;

// Re-export core types
pub use config::TicketingConfig;
pub use entity::{
    EntityId, EventId, OrderId, PaymentId, ReservationId, TicketCategoryId, TicketId, UserId,
};
pub use errors::{ErrorKind, TicketingError, TicketingResult};
pub use gateway::{
    ArtifactError, ArtifactGenerator, ArtifactHandle, ArtifactRequest, GatewayError,
    PaymentGateway, PaymentIntent, PaymentIntentRequest,
};
pub use identifiers::{ExternalReference, InvoiceNumber, SessionToken};
pub use inventory::{
    CommitToken, InventoryCounter, InventoryLedger, StockCommit, TicketCategory,
};
pub use money::{Currency, Money};
pub use order::{
    BuyerIdentity, CheckoutInstruction, CheckoutOrchestrator, Order, OrderLine, OrderStatus,
};
pub use payment::{
    CallbackOutcome, CallbackProcessor, CallbackStatus, Payment, PaymentChannel, PaymentNotice,
    PaymentStatus,
};
pub use reservation::{
    OwnerRef, Requester, Reservation, ReservationManager, ReservationStatus, SweepOutcome,
};
pub use services::TicketingServices;
pub use state_machine::{guard_transition, State, StateTransition, StatusTransitions};
pub use sweeper::{ExpirySweeper, SweeperHandle};
pub use ticket::{
    ArtifactStatus, HolderInfo, IssuanceReport, Ticket, TicketIssuance, TicketStatus,
};
