//! Fixed-point decimal arithmetic.
//!
//! `Fixed<D>` stores an unsigned value scaled by `10^D` in a `u128`.
//! Amounts and rates use [`Decimal`] (18 decimals); debt ownership fractions and
//! debt ledger ratios use [`PreciseDecimal`] (27 decimals).
//!
//! Every multiply-then-divide goes through a 256-bit intermediate and truncates
//! toward zero. Small rounding dust is expected; callers bound it, they do not
//! try to eliminate it.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unsigned fixed-point number with `D` decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed<const D: u32>(u128);

/// 18-decimal fixed-point value used for amounts, rates and ratios.
pub type Decimal = Fixed<18>;

/// 27-decimal fixed-point value used for debt shares and ledger ratios.
pub type PreciseDecimal = Fixed<27>;

/// Compute `a * b / c` with a 256-bit intermediate, truncating toward zero.
///
/// Returns `None` if `c == 0` or the result does not fit in a `u128`.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    let quotient = product.checked_div(U256::from(c))?;
    u128::try_from(quotient).ok()
}

impl<const D: u32> Fixed<D> {
    /// Raw representation of `1.0`.
    pub const UNIT: u128 = 10u128.pow(D);
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(Self::UNIT);
    pub const MAX: Self = Self(u128::MAX);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Whole-number constructor. Saturates instead of overflowing.
    pub const fn from_int(n: u64) -> Self {
        Self((n as u128).saturating_mul(Self::UNIT))
    }

    /// `numerator / denominator` as a fixed-point value, e.g. `from_ratio(1, 5) == 0.2`.
    pub fn from_ratio(numerator: u64, denominator: u64) -> Option<Self> {
        mul_div(numerator as u128, Self::UNIT, denominator as u128).map(Self)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Fixed-point multiplication, truncating.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        mul_div(self.0, rhs.0, Self::UNIT).map(Self)
    }

    /// Fixed-point division, truncating. `None` on division by zero.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        mul_div(self.0, Self::UNIT, rhs.0).map(Self)
    }

    /// `self * numerator / denominator` in a single rounding step.
    pub fn checked_mul_div(self, numerator: Self, denominator: Self) -> Option<Self> {
        mul_div(self.0, numerator.0, denominator.0).map(Self)
    }

    /// Absolute difference, useful for tolerance assertions.
    pub fn abs_diff(self, rhs: Self) -> Self {
        Self(self.0.abs_diff(rhs.0))
    }

    /// Rescale to another precision. Truncates when reducing decimals.
    pub fn rescale<const E: u32>(self) -> Option<Fixed<E>> {
        if E >= D {
            self.0
                .checked_mul(10u128.pow(E - D))
                .map(Fixed::<E>::from_raw)
        } else {
            Some(Fixed::<E>::from_raw(self.0 / 10u128.pow(D - E)))
        }
    }
}

impl Decimal {
    pub fn to_precise(self) -> Option<PreciseDecimal> {
        self.rescale::<27>()
    }
}

impl PreciseDecimal {
    pub fn to_decimal(self) -> Decimal {
        Decimal::from_raw(self.0 / 10u128.pow(27 - 18))
    }
}

impl<const D: u32> fmt::Display for Fixed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / Self::UNIT;
        let frac = self.0 % Self::UNIT;
        if frac == 0 {
            return write!(f, "{}", int);
        }
        let digits = format!("{:0width$}", frac, width = D as usize);
        write!(f, "{}.{}", int, digits.trim_end_matches('0'))
    }
}

/// Error returned when parsing a decimal string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDecimalError(pub String);

impl fmt::Display for ParseDecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal '{}'", self.0)
    }
}

impl std::error::Error for ParseDecimalError {}

impl<const D: u32> FromStr for Fixed<D> {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if frac_part.len() > D as usize {
            return Err(err());
        }
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(err());
        }

        let int: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err())?
        };
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac_part, width = D as usize);
            padded.parse().map_err(|_| err())?
        };

        int.checked_mul(Self::UNIT)
            .and_then(|v| v.checked_add(frac))
            .map(Self)
            .ok_or_else(err)
    }
}

impl<const D: u32> Serialize for Fixed<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, const D: u32> Deserialize<'de> for Fixed<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        // Accept both "1.5" and bare integers in JSON scenarios.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Int(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Int(n) => Ok(Self::from_int(n)),
        }
    }
}
