// Copyright 2025 Cowboy AI, LLC.

//! Configuration for the ticketing services
//!
//! Durations are stored as plain seconds so the struct deserializes from
//! any serde-compatible config source. The reservation TTL and the order
//! timeout are independent clocks: converting a reservation locks its
//! commitment to the order, and from then on only the order timeout
//! reclaims it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable durations and cadences for the ticketing domain services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    /// How long a reservation holds stock before the sweep reclaims it
    pub reservation_ttl_secs: u64,
    /// How long a pending order may await payment before expiring
    pub order_timeout_secs: u64,
    /// Cadence of the background expiry sweep
    pub sweep_interval_secs: u64,
    /// Upper bound on a payment-gateway round trip
    pub gateway_timeout_secs: u64,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 600,
            order_timeout_secs: 3_600,
            sweep_interval_secs: 30,
            gateway_timeout_secs: 10,
        }
    }
}

impl TicketingConfig {
    /// Reservation time-to-live
    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_ttl_secs as i64)
    }

    /// Pending-order timeout
    pub fn order_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.order_timeout_secs as i64)
    }

    /// Sweep cadence
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Gateway call timeout
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}
