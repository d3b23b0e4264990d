// Copyright 2025 Cowboy AI, LLC.

//! Monetary value objects
//!
//! Amounts are integers in the currency's minor unit. Arithmetic across
//! currencies is refused; multi-currency settlement is out of scope.

use crate::errors::{TicketingError, TicketingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO-4217-style currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from its code; stored uppercased
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_uppercase())
    }

    /// The currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount of money in a single currency, in minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's minor unit
    pub amount: u64,
    /// Currency of the amount
    pub currency: Currency,
}

impl Money {
    /// Create a new amount
    pub fn new(amount: u64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// The zero amount in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Add two amounts of the same currency; overflow is refused
    pub fn checked_add(&self, other: &Money) -> TicketingResult<Money> {
        if self.currency != other.currency {
            return Err(TicketingError::CurrencyMismatch {
                left: self.currency.code().to_string(),
                right: other.currency.code().to_string(),
            });
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(TicketingError::AmountOverflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Multiply a unit price by a quantity; overflow is refused
    pub fn scaled(&self, quantity: u32) -> TicketingResult<Money> {
        let amount = self
            .amount
            .checked_mul(u64::from(quantity))
            .ok_or(TicketingError::AmountOverflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
