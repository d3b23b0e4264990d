// Copyright 2025 Cowboy AI, LLC.

//! Persistence context for the ticketing domain
//!
//! Services receive an explicit [`TicketingStore`] handle from the process
//! entry point; there are no module-level singletons, which keeps test
//! doubles clean and state out of hiding.

mod memory;
mod store;

pub use memory::InMemoryTicketingStore;
pub use store::TicketingStore;
