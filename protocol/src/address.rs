//! # Addresses and Amounts
//!
//! Every participant in Pledge (borrower, lender, note holder, or one of the
//! protocol's own contracts) is identified by a 20-byte [`Address`].
//!
//! Account addresses are derived from an Ed25519 verifying key:
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE3(public_key) -> 32 bytes
//!     -> last 20 bytes       -> 0x3f9a…
//! ```
//!
//! Contract addresses have no key behind them. They are derived from a label
//! through a domain-separated BLAKE3 hash so they can never collide with an
//! account address by accident.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::hash::{blake3_hash, domain_separated_hash};
use crate::crypto::keys::PledgePublicKey;

/// Monetary amount in the smallest unit of its currency. Integral and
/// unsigned; there are no fractional or negative amounts.
pub type Amount = u128;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// BLAKE3 derive-key context for contract addresses.
const CONTRACT_ADDRESS_CONTEXT: &str = "pledge 2026 contract address";

/// Errors parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte account or contract identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never owned by anyone; used as "no currency".
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Derives the account address controlled by `public_key`.
    pub fn from_public_key(public_key: &PledgePublicKey) -> Self {
        let digest = blake3_hash(public_key.as_bytes());
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Derives a keyless contract address from a human-readable label,
    /// e.g. `"loan-core"` or `"currency:usdc"`.
    pub fn for_contract(label: &str) -> Self {
        let digest = domain_separated_hash(CONTRACT_ADDRESS_CONTEXT, label.as_bytes());
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Lower-case hex with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").ok_or(AddressError::MissingPrefix)?;
        let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let hex = hex::encode(self.0);
        write!(f, "Address(0x{}…{})", &hex[..6], &hex[hex.len() - 4..])
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
