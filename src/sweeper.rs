// Copyright 2025 Cowboy AI, LLC.

//! Background expiry sweeper
//!
//! One periodic task drives both reclamation passes: expired reservation
//! holds and stale pending orders. Each pass is idempotent and races
//! safely with the foreground paths, so a missed or doubled tick is
//! harmless.

use crate::errors::TicketingResult;
use crate::order::CheckoutOrchestrator;
use crate::reservation::{ReservationManager, SweepOutcome};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Periodic reclamation of expired reservations and stale pending orders
#[derive(Clone)]
pub struct ExpirySweeper {
    reservations: ReservationManager,
    orders: CheckoutOrchestrator,
    interval: Duration,
}

/// Handle to a spawned sweeper; dropping it does not stop the task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for the task to finish
    pub async fn shutdown(self) {
        // Send only fails if the task already exited; either way we join.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(%err, "sweeper task did not shut down cleanly");
        }
    }
}

impl ExpirySweeper {
    /// Create a sweeper over the two services that own reclamation
    pub fn new(
        reservations: ReservationManager,
        orders: CheckoutOrchestrator,
        interval: Duration,
    ) -> Self {
        Self {
            reservations,
            orders,
            interval,
        }
    }

    /// Run both reclamation passes once at the current time
    ///
    /// Exposed so callers can trigger a sweep outside the periodic loop,
    /// and so tests can drive sweeps deterministically.
    pub async fn sweep_once(&self) -> TicketingResult<(SweepOutcome, SweepOutcome)> {
        let now = Utc::now();
        let reservations = self.reservations.sweep_expired(now).await?;
        let orders = self.orders.sweep_stale_orders(now).await?;
        Ok((reservations, orders))
    }

    /// Spawn the periodic sweep loop on the current runtime
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A failed pass is retried on the next tick; the
                        // loop itself never dies of a storage error.
                        match self.sweep_once().await {
                            Ok((reservations, orders)) => {
                                debug!(
                                    reservations_reclaimed = reservations.reclaimed,
                                    orders_reclaimed = orders.reclaimed,
                                    "sweep pass complete"
                                );
                            }
                            Err(err) => {
                                warn!(%err, "sweep pass failed");
                            }
                        }
                    }
                    _ = stop.changed() => {
                        debug!("sweeper shutting down");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown, task }
    }
}
