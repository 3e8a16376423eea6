//! # Protocol Configuration & Constants
//!
//! Every magic number in Pledge lives here. Values that differ per
//! deployment (network, fee sink, fee rate) live in [`ProtocolConfig`],
//! which loads from JSON and refuses to come up with nonsense in it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

pub const NETWORK_ID_MAINNET: u64 = 0x504C_4447; // "PLDG"
pub const NETWORK_ID_TESTNET: u64 = 0x504C_4454; // "PLDT"
pub const NETWORK_ID_DEVNET: u64 = 0x504C_4444; // "PLDD"

// ---------------------------------------------------------------------------
// Structured-message domain
// ---------------------------------------------------------------------------

/// Domain name every loan-terms signature is bound to.
pub const DOMAIN_NAME: &str = "PledgeOrigination";

/// Domain version. Bump it and every outstanding signed offer dies.
pub const DOMAIN_VERSION: &str = "1";

/// Domain name for collateral permits, which are verified by the vault.
pub const PERMIT_DOMAIN_NAME: &str = "PledgeCollateralVault";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

pub const SECRET_KEY_LENGTH: usize = 32;
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// 1 basis point = 1/10_000. Every rate in the protocol is expressed in these.
pub const BASIS_POINTS_DENOMINATOR: u128 = 10_000;

/// Origination fee charged against principal: 2.00%.
pub const DEFAULT_ORIGINATION_FEE_BPS: u32 = 200;

/// Fee-rule key for the origination fee.
pub const ORIGINATION_FEE: &str = "originationFee";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub network_id: u64,
    pub domain_name: String,
    pub domain_version: String,
    /// Origination fee in basis points of principal.
    pub origination_fee_bps: u32,
    /// Where origination fees are routed.
    pub fee_sink: Address,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    pub log_format: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network_id: NETWORK_ID_DEVNET,
            domain_name: DOMAIN_NAME.to_string(),
            domain_version: DOMAIN_VERSION.to_string(),
            origination_fee_bps: DEFAULT_ORIGINATION_FEE_BPS,
            fee_sink: Address::for_contract("fee-sink"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ProtocolConfig {
    /// Parse from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain_name.is_empty() || self.domain_version.is_empty() {
            return Err(ConfigError::Invalid(
                "domain name and version must be non-empty".into(),
            ));
        }
        if self.origination_fee_bps as u128 > BASIS_POINTS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "origination_fee_bps {} exceeds {}",
                self.origination_fee_bps, BASIS_POINTS_DENOMINATOR
            )));
        }
        if self.fee_sink.is_zero() {
            return Err(ConfigError::Invalid("fee_sink must not be the zero address".into()));
        }
        Ok(())
    }
}

/// Friendly network name for log lines. Unknown ids get a hex dump.
pub fn network_name(network_id: u64) -> String {
    match network_id {
        NETWORK_ID_MAINNET => "mainnet".to_string(),
        NETWORK_ID_TESTNET => "testnet".to_string(),
        NETWORK_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}
