use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Fixed-point amount with [`DECIMALS`] implied decimal places.
pub type Amount = u128;

/// Seconds since the Unix epoch. Every time-dependent call receives one explicitly.
pub type Timestamp = u64;

/// Monotonic round counter, starting at 1.
pub type RoundId = u64;

pub const DECIMALS: u32 = 18;

/// One whole token expressed in base units.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

pub const MINUTE: u64 = 60;
pub const HOUR: u64 = 60 * MINUTE;
pub const DAY: u64 = 24 * HOUR;

/// Convert a whole-token count into base units.
pub const fn tokens(whole: u128) -> Amount {
    whole * ONE_TOKEN
}

/// `amount * numerator / denominator`, truncated toward zero.
///
/// Falls back to a split quotient/remainder evaluation when the direct product
/// would overflow, so the result stays exact for every representable amount.
pub fn mul_div_floor(amount: Amount, numerator: u128, denominator: u128) -> Amount {
    if denominator == 0 {
        return 0;
    }
    match amount.checked_mul(numerator) {
        Some(product) => product / denominator,
        None => {
            let quotient = amount / denominator;
            let remainder = amount % denominator;
            quotient
                .saturating_mul(numerator)
                .saturating_add(remainder * numerator / denominator)
        }
    }
}

/// Opaque, address-like account identity.
///
/// Identities are compared case-insensitively: `0xAbC` and `0xabc` name the same holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// Hash-derived content key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derive the key from the uploader, storage pointer, round and registry sequence.
    ///
    /// The sequence number keeps ids unique when one uploader registers the same
    /// pointer twice.
    pub fn derive(uploader: &AccountId, cid: &str, round_id: RoundId, sequence: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(uploader.as_str().as_bytes());
        hasher.update(&[0u8]);
        hasher.update(cid.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(&round_id.to_be_bytes());
        hasher.update(&sequence.to_be_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize amounts as decimal strings.
///
/// 18-decimal balances overflow JSON's safe integer range, and `serde_json::Value`
/// cannot hold integers above `u64::MAX`.
pub mod amount_serde {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse::<Amount>().map_err(serde::de::Error::custom)
    }
}
