//! Fixed-point quantities used for bonds, rewards and fractions.
//!
//! Both [`Amount`] and [`FixedPoint`] carry [`DECIMALS`] fractional digits on top of a 256-bit
//! unsigned integer so that bond arithmetic never drifts the way floating point would. All
//! arithmetic is checked and floors.

use std::{fmt, str::FromStr};

use ethnum::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    decimal::{format_decimal, parse_decimal, SCALE},
    errors::ParseError,
};

/// Number of fractional digits carried by [`Amount`] and [`FixedPoint`].
pub const DECIMALS: u32 = 18;

/// A token quantity in base units, where one whole token is `10^18` base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Creates an amount of `tokens` whole tokens.
    pub const fn from_tokens(tokens: u64) -> Self {
        Self(U256::new(tokens as u128 * 1_000_000_000_000_000_000))
    }

    /// Creates an amount from raw base units.
    pub const fn from_base_units(units: U256) -> Self {
        Self(units)
    }

    /// Returns the raw base units.
    pub const fn to_base_units(self) -> U256 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Subtracts `rhs`, returning `None` if it is larger than `self`.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Subtracts `rhs`, clamping at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiplies by an integer factor, returning `None` on overflow.
    pub fn checked_mul_int(self, factor: U256) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Multiplies by a fixed-point factor, flooring the result.
    pub fn checked_mul_fixed(self, factor: FixedPoint) -> Option<Self> {
        self.0.checked_mul(factor.0).map(|product| Self(product / SCALE))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_decimal(self.0))
    }
}

impl FromStr for Amount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(Self)
    }
}

/// An unsigned fixed-point ratio such as a multiplier, a fee or a slashing fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedPoint(U256);

impl FixedPoint {
    /// The ratio `0`.
    pub const ZERO: Self = Self(U256::ZERO);

    /// The ratio `1`.
    pub const ONE: Self = Self(SCALE);

    /// Creates the ratio `numerator / denominator`, flooring to 18 decimals.
    ///
    /// Returns `None` if the denominator is zero.
    pub const fn from_ratio(numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }

        let raw = numerator as u128 * 1_000_000_000_000_000_000 / denominator as u128;
        Some(Self(U256::new(raw)))
    }

    /// Creates a ratio from its raw 18-decimal representation.
    pub const fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Returns the raw 18-decimal representation.
    pub const fn to_raw(self) -> U256 {
        self.0
    }

    /// Returns true if the ratio is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_decimal(self.0))
    }
}

impl FromStr for FixedPoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(Self)
    }
}

/// Accepts either a decimal string or a bare whole number so that TOML and JSON files can say
/// `base_bond_amount = 100` as well as `base_bond_amount = "100.5"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalShim {
    Text(String),
    Whole(u64),
}

impl DecimalShim {
    fn into_raw<E: de::Error>(self) -> Result<U256, E> {
        match self {
            DecimalShim::Text(text) => parse_decimal(&text).map_err(de::Error::custom),
            DecimalShim::Whole(whole) => U256::from(whole)
                .checked_mul(SCALE)
                .ok_or_else(|| de::Error::custom("decimal overflows 256 bits")),
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DecimalShim::deserialize(deserializer)?.into_raw().map(Self)
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DecimalShim::deserialize(deserializer)?.into_raw().map(Self)
    }
}
