// Copyright 2025 Cowboy AI, LLC.

//! Service wiring
//!
//! Builds the full service graph from the three externally-supplied
//! collaborators (store, payment gateway, artifact generator) and the
//! runtime configuration. The process entry point owns this bundle and
//! hands the individual services to whatever surface exposes them.

use crate::config::TicketingConfig;
use crate::gateway::{ArtifactGenerator, PaymentGateway};
use crate::inventory::InventoryLedger;
use crate::order::CheckoutOrchestrator;
use crate::payment::CallbackProcessor;
use crate::persistence::TicketingStore;
use crate::reservation::ReservationManager;
use crate::sweeper::ExpirySweeper;
use crate::ticket::TicketIssuance;
use std::sync::Arc;

/// The wired-up ticketing services
#[derive(Clone)]
pub struct TicketingServices {
    /// Inventory ledger (category registration, capacity adjustment)
    pub ledger: InventoryLedger,
    /// Reservation manager
    pub reservations: ReservationManager,
    /// Order and checkout orchestrator
    pub checkout: CheckoutOrchestrator,
    /// Payment callback processor
    pub callbacks: CallbackProcessor,
    /// Ticket issuance
    pub issuance: TicketIssuance,
    /// Background expiry sweeper, not yet spawned
    pub sweeper: ExpirySweeper,
}

impl TicketingServices {
    /// Wire the service graph over the given collaborators
    pub fn new(
        store: Arc<dyn TicketingStore>,
        gateway: Arc<dyn PaymentGateway>,
        artifacts: Arc<dyn ArtifactGenerator>,
        config: TicketingConfig,
    ) -> Self {
        let ledger = InventoryLedger::new(store.clone());
        let reservations =
            ReservationManager::new(store.clone(), ledger.clone(), config.clone());
        let checkout = CheckoutOrchestrator::new(
            store.clone(),
            reservations.clone(),
            gateway,
            config.clone(),
        );
        let issuance = TicketIssuance::new(store.clone(), artifacts);
        let callbacks = CallbackProcessor::new(store, reservations.clone(), issuance.clone());
        let sweeper = ExpirySweeper::new(
            reservations.clone(),
            checkout.clone(),
            config.sweep_interval(),
        );

        Self {
            ledger,
            reservations,
            checkout,
            callbacks,
            issuance,
            sweeper,
        }
    }
}
