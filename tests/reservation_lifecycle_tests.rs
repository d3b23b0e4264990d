// Copyright 2025 Cowboy AI, LLC.

//! Reservation TTL, sweep reclamation, and the convert-vs-expire race.

mod common;

use chrono::{Duration, Utc};
use cim_ticketing::persistence::TicketingStore;
use cim_ticketing::{ExpirySweeper, Requester, ReservationStatus, TicketingConfig, TicketingError};
use common::{guest, session_owner, Harness};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_sweep_reclaims_only_elapsed_holds() {
    let harness = Harness::new(10).await;
    let reservation = harness.reserve(4, session_owner("alice")).await;
    assert_eq!(harness.remaining().await, 6);

    // Before the TTL elapses the sweep must not touch the hold.
    let outcome = harness
        .services
        .reservations
        .sweep_expired(Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome.examined, 0);
    assert_eq!(harness.remaining().await, 6);

    let after_ttl = reservation.expires_at + Duration::seconds(1);
    let outcome = harness
        .services
        .reservations
        .sweep_expired(after_ttl)
        .await
        .unwrap();
    assert_eq!(outcome.examined, 1);
    assert_eq!(outcome.reclaimed, 1);
    assert_eq!(harness.remaining().await, 10);

    let row = harness
        .store
        .reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ReservationStatus::Expired);

    // A second pass finds nothing left to reclaim.
    let outcome = harness
        .services
        .reservations
        .sweep_expired(after_ttl)
        .await
        .unwrap();
    assert_eq!(outcome.reclaimed, 0);
}

#[tokio::test]
async fn test_spawned_sweeper_reclaims_and_shuts_down() {
    let config = TicketingConfig {
        reservation_ttl_secs: 0,
        ..TicketingConfig::default()
    };
    let harness = Harness::with_config(10, config).await;
    harness.reserve(4, session_owner("alice")).await;
    assert_eq!(harness.remaining().await, 6);

    // The hold expired at creation; the loop must pick it up on its own.
    let sweeper = ExpirySweeper::new(
        harness.services.reservations.clone(),
        harness.services.checkout.clone(),
        std::time::Duration::from_millis(10),
    );
    let handle = sweeper.spawn();

    let mut reclaimed = false;
    for _ in 0..200 {
        if harness.remaining().await == 10 {
            reclaimed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    assert!(reclaimed, "background loop never reclaimed the expired hold");
    assert_eq!(harness.remaining().await, 10);
}

#[tokio::test]
async fn test_cancel_requires_owner_or_admin() {
    let harness = Harness::new(10).await;
    let reservation = harness.reserve(3, session_owner("alice")).await;

    let stranger = Requester::Subject(session_owner("mallory"));
    assert!(matches!(
        harness
            .services
            .reservations
            .cancel(reservation.id, &stranger)
            .await,
        Err(TicketingError::NotOwner { .. })
    ));
    assert_eq!(harness.remaining().await, 7);

    harness
        .services
        .reservations
        .cancel(reservation.id, &Requester::Subject(session_owner("alice")))
        .await
        .unwrap();
    assert_eq!(harness.remaining().await, 10);

    // Terminal; an admin cannot cancel it a second time.
    assert!(matches!(
        harness
            .services
            .reservations
            .cancel(reservation.id, &Requester::Admin)
            .await,
        Err(TicketingError::ReservationNotActive { .. })
    ));
}

#[tokio::test]
async fn test_expired_hold_refused_at_order_creation() {
    let harness = Harness::new(10).await;
    let reservation = harness.reserve(2, session_owner("alice")).await;

    // Checkout arrives after the TTL but before any sweep pass.
    let late = reservation.expires_at + Duration::seconds(1);
    let result = harness
        .services
        .checkout
        .create_order_from_reservations(&[reservation.id], &guest("alice"), late)
        .await;
    assert!(matches!(
        result,
        Err(TicketingError::ReservationNotActive { .. })
    ));

    // The refusal did the sweep's job: hold expired, stock returned.
    let row = harness
        .store
        .reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ReservationStatus::Expired);
    assert_eq!(harness.remaining().await, 10);
}

#[tokio::test]
async fn test_convert_and_sweep_race_has_exactly_one_winner() {
    let harness = Harness::new(10).await;
    let reservation = harness.reserve(2, session_owner("alice")).await;

    // The sweep believes the TTL has elapsed; checkout does not. Run both
    // at once and let the status CAS arbitrate.
    let past_ttl = reservation.expires_at + Duration::seconds(1);
    let reservation_ids = [reservation.id];
    let buyer = guest("alice");
    let convert = harness.services.checkout.create_order_from_reservations(
        &reservation_ids,
        &buyer,
        Utc::now(),
    );
    let sweep = harness.services.reservations.sweep_expired(past_ttl);
    let (order, outcome) = tokio::join!(convert, sweep);
    let outcome = outcome.unwrap();

    let row = harness
        .store
        .reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    match row.status {
        ReservationStatus::Converted => {
            assert!(order.is_ok());
            assert_eq!(outcome.reclaimed, 0);
            assert_eq!(harness.remaining().await, 8, "commitment stays with the order");
        }
        ReservationStatus::Expired => {
            assert!(order.is_err());
            assert_eq!(outcome.reclaimed, 1);
            assert_eq!(harness.remaining().await, 10, "stock released exactly once");
        }
        other => panic!("reservation left in {other:?}"),
    }
}

#[tokio::test]
async fn test_converted_hold_is_invisible_to_the_sweep() {
    let harness = Harness::new(10).await;
    let reservation = harness.reserve(2, session_owner("alice")).await;

    harness
        .services
        .checkout
        .create_order_from_reservations(&[reservation.id], &guest("alice"), Utc::now())
        .await
        .unwrap();

    // Even well past the TTL, conversion already moved the row out of
    // ACTIVE; the commitment now belongs to the order.
    let late = reservation.expires_at + Duration::minutes(5);
    let outcome = harness
        .services
        .reservations
        .sweep_expired(late)
        .await
        .unwrap();
    assert_eq!(outcome.examined, 0);
    assert_eq!(harness.remaining().await, 8);

    let row = harness
        .store
        .reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ReservationStatus::Converted);
}
