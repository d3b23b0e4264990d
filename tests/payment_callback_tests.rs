// Copyright 2025 Cowboy AI, LLC.

//! Idempotent callback processing: duplicate deliveries, stale and
//! conflicting notices, failure releases, and manual confirmation.

mod common;

use chrono::Utc;
use cim_ticketing::persistence::TicketingStore;
use cim_ticketing::{
    CallbackOutcome, CallbackStatus, ExternalReference, Order, OrderStatus, PaymentChannel,
    PaymentNotice, PaymentStatus, TicketStatus, TicketingError,
};
use common::{guest, session_owner, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;

/// Reserve, order, and initiate checkout; returns the pending order and
/// the reference callbacks will arrive under.
async fn checkout(
    harness: &Harness,
    quantity: u32,
    channel: PaymentChannel,
) -> (Order, ExternalReference) {
    let reservation = harness.reserve(quantity, session_owner("alice")).await;
    let buyer = guest("alice");
    let order = harness
        .services
        .checkout
        .create_order_from_reservations(&[reservation.id], &buyer, Utc::now())
        .await
        .unwrap();
    let instruction = harness
        .services
        .checkout
        .initiate_checkout(order.id, channel, &buyer)
        .await
        .unwrap();
    (order, instruction.external_reference)
}

fn notice(reference: &ExternalReference, status: CallbackStatus) -> PaymentNotice {
    PaymentNotice {
        external_reference: reference.clone(),
        status,
        raw: json!({"transaction_status": format!("{status:?}")}),
    }
}

#[tokio::test]
async fn test_success_callback_settles_order_and_issues_tickets() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 2, PaymentChannel::Gateway).await;

    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Processed);

    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Success);
    assert!(row.paid_at.is_some());

    let tickets = harness.store.tickets_for_order(order.id).await.unwrap();
    assert_eq!(tickets.len(), 2);
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Active));
    assert!(tickets.iter().all(|t| t.artifact_url.is_some()));

    // The stock is sold, not merely held: committed survives, nothing is
    // released back to availability.
    let counter = harness
        .store
        .counter(harness.category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(counter.sold, 2);
    assert_eq!(harness.remaining().await, 8);
}

#[tokio::test]
async fn test_duplicate_success_callback_changes_nothing() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 2, PaymentChannel::Gateway).await;

    harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();
    let artifacts_after_first = harness.artifacts.calls.load(Ordering::SeqCst);

    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyProcessed);

    let tickets = harness.store.tickets_for_order(order.id).await.unwrap();
    assert_eq!(tickets.len(), 2, "no duplicate ticket rows");
    assert_eq!(
        harness.artifacts.calls.load(Ordering::SeqCst),
        artifacts_after_first,
        "no second artifact generation"
    );

    let counter = harness
        .store
        .counter(harness.category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(counter.sold, 2, "no double finalize");
}

#[tokio::test]
async fn test_failed_callback_fails_order_and_returns_stock() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 3, PaymentChannel::Gateway).await;
    assert_eq!(harness.remaining().await, 7);

    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Failed))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Processed);

    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Failed);
    assert_eq!(harness.remaining().await, 10);
    assert!(harness
        .store
        .tickets_for_order(order.id)
        .await
        .unwrap()
        .is_empty());

    // Redelivery of the same failure releases nothing twice.
    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Failed))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyProcessed);
    assert_eq!(harness.remaining().await, 10);
}

#[tokio::test]
async fn test_manual_confirmation_matches_gateway_success() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 2, PaymentChannel::ManualTransfer).await;

    let outcome = harness
        .services
        .callbacks
        .handle_callback(PaymentNotice::manual_confirmation(reference.clone(), "ops@venue"))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Processed);

    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Success);
    assert_eq!(
        harness.store.tickets_for_order(order.id).await.unwrap().len(),
        2
    );

    let payment = harness
        .store
        .payment_by_external_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.raw_callback.unwrap()["source"], "manual_confirmation");
}

#[tokio::test]
async fn test_stale_expiry_after_success_is_dropped() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 1, PaymentChannel::Gateway).await;

    harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();

    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Expired))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadyProcessed);

    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Success);
}

#[tokio::test]
async fn test_success_after_failure_is_flagged_as_conflict() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 1, PaymentChannel::Gateway).await;

    harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Failed))
        .await
        .unwrap();

    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Conflicting);

    // Flagged, not applied: the order stays failed and no tickets exist.
    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Failed);
    assert!(harness
        .store
        .tickets_for_order(order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_refund_callback_reverses_a_settled_order() {
    let harness = Harness::new(10).await;
    let (order, reference) = checkout(&harness, 1, PaymentChannel::Gateway).await;

    harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Success))
        .await
        .unwrap();
    let outcome = harness
        .services
        .callbacks
        .handle_callback(notice(&reference, CallbackStatus::Refunded))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Processed);

    let row = harness.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(row.status, OrderStatus::Refunded);
    let payment = harness
        .store
        .payment_by_external_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_unknown_reference_is_an_error() {
    let harness = Harness::new(10).await;
    let result = harness
        .services
        .callbacks
        .handle_callback(notice(
            &ExternalReference::new("PAY-UNKNOWN"),
            CallbackStatus::Success,
        ))
        .await;
    assert!(matches!(result, Err(TicketingError::NotFound { .. })));
}
