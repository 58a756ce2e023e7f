use crate::error::{Result, ShopError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use tokio::time::Instant;

/// A balance figure in minor currency units (kopecks, cents).
///
/// Never computed locally from deltas; the core only mirrors what the ledger
/// reports and compares snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Balance(pub i64);

/// A strictly positive amount in minor units, used for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(ShopError::Validation("Amount must be positive".to_string()))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = ShopError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn new(minor: i64) -> Self {
        Self(minor)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Whether this balance covers `price`.
    pub fn covers(&self, price: Amount) -> bool {
        self.0 >= price.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Balance::from(*self), f)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// USD to local currency conversion rate, as last fetched from the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRate {
    usd_to_local: Decimal,
    fetched_at: Instant,
}

impl ExchangeRate {
    /// Rejects non-positive rates so conversions can never collapse to zero.
    pub fn new(usd_to_local: Decimal, fetched_at: Instant) -> Result<Self> {
        if usd_to_local > Decimal::ZERO {
            Ok(Self {
                usd_to_local,
                fetched_at,
            })
        } else {
            Err(ShopError::Validation(format!(
                "Exchange rate must be positive, got {}",
                usd_to_local
            )))
        }
    }

    pub fn usd_to_local(&self) -> Decimal {
        self.usd_to_local
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Converts USD minor units to local minor units, rounding half-up.
    ///
    /// Both currencies have 100 minor units per major unit, so the rate applies
    /// directly to minor units. Displayed and submitted amounts must both go
    /// through this function.
    pub fn to_local(&self, usd: Amount) -> Result<Balance> {
        let local = Decimal::from(usd.value())
            .checked_mul(self.usd_to_local)
            .ok_or(ShopError::ConversionOverflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        local
            .to_i64()
            .map(Balance)
            .ok_or(ShopError::ConversionOverflow)
    }
}
