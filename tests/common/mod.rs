// Copyright 2025 Cowboy AI, LLC.

//! Shared fixture for the integration tests: an in-memory store wired
//! into the full service graph, plus counting doubles for the two
//! external collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use cim_ticketing::persistence::InMemoryTicketingStore;
use cim_ticketing::{
    ArtifactError, ArtifactGenerator, ArtifactHandle, ArtifactRequest, BuyerIdentity, Currency,
    ExternalReference, GatewayError, Money, OwnerRef, PaymentGateway, PaymentIntent,
    PaymentIntentRequest, Reservation, SessionToken, TicketCategory, TicketCategoryId,
    TicketingConfig, TicketingServices,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Gateway double: always creates an intent, counts the calls
#[derive(Default)]
pub struct StaticGateway {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            redirect_url: format!("https://pay.example/{}", request.invoice),
            external_reference: ExternalReference::new(format!("PAY-{}", request.invoice)),
        })
    }
}

/// Artifact double: fails the first `failures` calls, succeeds after,
/// counts every attempt
pub struct FlakyArtifacts {
    pub calls: AtomicUsize,
    remaining_failures: AtomicUsize,
}

impl FlakyArtifacts {
    pub fn reliable() -> Self {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ArtifactGenerator for FlakyArtifacts {
    async fn generate(&self, request: ArtifactRequest) -> Result<ArtifactHandle, ArtifactError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ArtifactError("renderer offline".to_string()));
        }
        Ok(ArtifactHandle {
            url: format!("https://tickets.example/{}.png", request.ticket),
        })
    }
}

/// Fully wired service graph over one registered category
pub struct Harness {
    pub store: Arc<InMemoryTicketingStore>,
    pub services: TicketingServices,
    pub gateway: Arc<StaticGateway>,
    pub artifacts: Arc<FlakyArtifacts>,
    pub category_id: TicketCategoryId,
}

impl Harness {
    pub async fn new(capacity: u32) -> Self {
        Self::build(capacity, TicketingConfig::default(), FlakyArtifacts::reliable()).await
    }

    pub async fn with_config(capacity: u32, config: TicketingConfig) -> Self {
        Self::build(capacity, config, FlakyArtifacts::reliable()).await
    }

    pub async fn with_failing_artifacts(capacity: u32, failures: usize) -> Self {
        Self::build(
            capacity,
            TicketingConfig::default(),
            FlakyArtifacts::failing(failures),
        )
        .await
    }

    async fn build(capacity: u32, config: TicketingConfig, artifacts: FlakyArtifacts) -> Self {
        let store = Arc::new(InMemoryTicketingStore::new());
        let gateway = Arc::new(StaticGateway::default());
        let artifacts = Arc::new(artifacts);
        let services = TicketingServices::new(
            store.clone(),
            gateway.clone(),
            artifacts.clone(),
            config,
        );

        let category = TicketCategory::new(
            cim_ticketing::EventId::new(),
            "GA",
            Money::new(150_000, Currency::new("IDR")),
            capacity,
        );
        let category_id = category.id;
        services
            .ledger
            .register_category(category)
            .await
            .expect("category registration");

        Self {
            store,
            services,
            gateway,
            artifacts,
            category_id,
        }
    }

    pub async fn reserve(&self, quantity: u32, owner: OwnerRef) -> Reservation {
        self.services
            .reservations
            .create_reservation(self.category_id, quantity, owner, Utc::now())
            .await
            .expect("reservation")
    }

    pub async fn remaining(&self) -> u32 {
        self.services
            .reservations
            .availability(self.category_id)
            .await
            .expect("availability")
    }
}

pub fn guest(tag: &str) -> BuyerIdentity {
    BuyerIdentity::Guest {
        session: SessionToken::new(format!("session-{tag}")),
        email: format!("{tag}@example.com"),
    }
}

pub fn session_owner(tag: &str) -> OwnerRef {
    OwnerRef::Session(SessionToken::new(format!("session-{tag}")))
}
