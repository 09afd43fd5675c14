//! Shared value types: content hashes and token amounts.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Content-derived identifier of a packed archive.
///
/// Stored as the lowercase hex string the packer produced; two archives built
/// from identical content always carry equal hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of decimal places in a [`TokenAmount`].
pub const TOKEN_DECIMALS: u32 = 18;

const UNITS_PER_TOKEN: u128 = 10u128.pow(TOKEN_DECIMALS);

/// Ledger amount in integer base units (18 decimals).
///
/// Serialized as a decimal string (`"0.3"`) so records stay readable and no
/// precision is lost through JSON numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn from_whole(tokens: u64) -> Self {
        Self(u128::from(tokens) * UNITS_PER_TOKEN)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: TokenAmount) -> TokenAmount {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_mul(self, factor: u64) -> Option<TokenAmount> {
        self.0.checked_mul(u128::from(factor)).map(Self)
    }
}

/// Error parsing a decimal token amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid token amount '{input}': {reason}")]
pub struct ParseAmountError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for TokenAmount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let fail = |reason| ParseAmountError {
            input: s.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(fail("empty"));
        }

        let (whole, fraction) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(fail("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(fail("only digits and a single '.' are allowed"));
        }
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(fail("more than 18 decimal places"));
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| fail("whole part out of range"))?
        };
        let mut fraction_units = if fraction.is_empty() {
            0
        } else {
            fraction
                .parse::<u128>()
                .map_err(|_| fail("fraction out of range"))?
        };
        fraction_units *= 10u128.pow(TOKEN_DECIMALS - fraction.len() as u32);

        whole_units
            .checked_mul(UNITS_PER_TOKEN)
            .and_then(|units| units.checked_add(fraction_units))
            .map(TokenAmount)
            .ok_or_else(|| fail("amount out of range"))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_TOKEN;
        let fraction = self.0 % UNITS_PER_TOKEN;
        if fraction == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", fraction, width = TOKEN_DECIMALS as usize);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older records wrote plain JSON numbers; accept both.
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a decimal amount, found {}",
                    other
                )))
            }
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}
