//! Ledger amounts in the smallest unit.
//!
//! Balances travel as base-10 integer strings so that values beyond 2^53
//! survive JSON round trips. Internally they are 256-bit unsigned integers,
//! the width the settlement contract uses.
//!
//! **NEVER use f64 for balances!**

use crate::{ChannelError, Result};
use ethers::types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Balance in the ledger's smallest unit.
///
/// # Examples
///
/// ```rust
/// use relaypay_lib::TokenAmount;
///
/// let a: TokenAmount = "900".parse().unwrap();
/// let b = TokenAmount::from(100u64);
/// assert_eq!(a.checked_add(&b).unwrap().to_string(), "1000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    /// Zero balance.
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    /// Wrap a raw 256-bit value.
    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    /// The raw 256-bit value, as passed to the settlement contract.
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Parse a base-10 integer string.
    ///
    /// Only ASCII digits are accepted: no sign, no decimal point, no `0x`
    /// prefix, no surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] if the string is empty, contains
    /// anything but digits, or does not fit in 256 bits.
    pub fn parse_decimal(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ChannelError::Validation("empty amount".into()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ChannelError::Validation(format!(
                "amount must be a base-10 integer string, got {:?}",
                s
            )));
        }
        U256::from_dec_str(s)
            .map(Self)
            .map_err(|e| ChannelError::Validation(format!("invalid amount {:?}: {:?}", s, e)))
    }

    /// Checked addition (returns None on overflow)
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction (returns None on underflow)
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Check if amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for TokenAmount {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_decimal(s)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // U256's Display is base 10
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_decimal(&raw).map_err(serde::de::Error::custom)
    }
}
