//! Coin amount type.
//!
//! Coins are whole units stored as `u64`. The type cannot go below zero, so a
//! balance that would become negative surfaces as a failed `checked_sub`
//! rather than a wrapped value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// A non-negative number of coins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(u64);

impl Coins {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Apply a signed delta. Returns `None` on underflow or overflow.
    pub fn checked_apply(self, delta: i64) -> Option<Self> {
        if delta >= 0 {
            self.0.checked_add(delta as u64).map(Self)
        } else {
            self.0.checked_sub(delta.unsigned_abs()).map(Self)
        }
    }
}

impl Add for Coins {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Coins {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, c| acc + c)
    }
}

impl From<u64> for Coins {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} coins", self.0)
    }
}
