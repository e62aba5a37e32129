//! Fixed-point monetary value.
//!
//! All totals in the system are computed with `Money`; floating point never
//! enters the valuation path.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// A monetary amount backed by a fixed-point decimal.
///
/// `Money` is currency-agnostic: the currency code travels with the document,
/// not with every amount. Arithmetic is exact decimal arithmetic.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Money {
        Money(self.0.abs())
    }

    /// `self * (1 + pct/100)`: add a percentage (e.g. tax on a net amount).
    pub fn plus_percent(&self, pct: Decimal) -> Money {
        Money(self.0 * (Decimal::ONE + pct / Decimal::ONE_HUNDRED))
    }

    /// `self * (1 - pct/100)`: subtract a percentage (e.g. a reduction).
    pub fn less_percent(&self, pct: Decimal) -> Money {
        Money(self.0 * (Decimal::ONE - pct / Decimal::ONE_HUNDRED))
    }

    /// `self / (1 + pct/100)`: strip an included percentage (e.g. remove
    /// tax from a gross amount). `pct` must be > -100.
    pub fn strip_percent(&self, pct: Decimal) -> Money {
        Money(self.0 / (Decimal::ONE + pct / Decimal::ONE_HUNDRED))
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, rhs: Decimal) -> Money {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}
