//! # Structured-Message Encoding
//!
//! Loan terms are agreed off-channel and signed as a *structured message*:
//! a record hashed under a fixed type-and-order encoding and bound to a
//! domain (protocol name, version, network, verifying contract). The same
//! bytes must come out of every signer and every verifier:
//!
//! ```text
//! typeHash        = H(type string)
//! word(uint256)   = 32-byte big-endian, left-padded
//! word(address)   = 12 zero bytes ‖ 20 address bytes
//! word(string)    = H(utf8 bytes)
//! structHash      = H(typeHash ‖ word₁ ‖ … ‖ wordₙ)
//! digest          = H(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)
//! ```
//!
//! `H` is SHA-256. Field order is the order of the type string, never
//! alphabetical, never "whatever serde does".

use serde::{Deserialize, Serialize};

use crate::address::{Address, ADDRESS_LENGTH};
use crate::crypto::hash::{sha256, sha256_multi};

/// Width of one encoded field.
pub const WORD_LENGTH: usize = 32;

/// Type string of the domain record.
pub const DOMAIN_TYPE: &str =
    "Domain(string name,string version,uint256 networkId,address verifyingAddress)";

/// Two-byte prefix that keeps structured digests disjoint from any other
/// signed payload.
const DIGEST_PREFIX: [u8; 2] = [0x19, 0x01];

/// The domain a signature is bound to.
///
/// A signature made for one verifying contract, network, or protocol
/// version is worthless under any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub network_id: u64,
    pub verifying_address: Address,
}

impl TypedDataDomain {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        network_id: u64,
        verifying_address: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            network_id,
            verifying_address,
        }
    }

    /// Hash of the domain record, mixed into every digest.
    pub fn separator(&self) -> [u8; 32] {
        let mut encoder = WordEncoder::new(DOMAIN_TYPE);
        encoder
            .string(&self.name)
            .string(&self.version)
            .uint(self.network_id as u128)
            .address(&self.verifying_address);
        encoder.finish()
    }

    /// Final digest to sign for `message` under this domain.
    pub fn digest<T: TypedStruct>(&self, message: &T) -> [u8; 32] {
        sha256_multi(&[&DIGEST_PREFIX, &self.separator(), &message.struct_hash()])
    }
}

/// A record with a fixed structured-message type.
///
/// Implementors list their fields in [`encode_fields`](Self::encode_fields)
/// in exactly the order of [`TYPE`](Self::TYPE).
pub trait TypedStruct {
    /// Canonical type string, e.g. `"LoanTerms(uint256 dueDate,...)"`.
    const TYPE: &'static str;

    fn encode_fields(&self, encoder: &mut WordEncoder);

    fn struct_hash(&self) -> [u8; 32] {
        let mut encoder = WordEncoder::new(Self::TYPE);
        self.encode_fields(&mut encoder);
        encoder.finish()
    }
}

/// Accumulates 32-byte words behind a type hash.
pub struct WordEncoder {
    buf: Vec<u8>,
}

impl WordEncoder {
    pub fn new(type_string: &str) -> Self {
        let mut buf = Vec::with_capacity(WORD_LENGTH * 8);
        buf.extend_from_slice(&sha256(type_string.as_bytes()));
        Self { buf }
    }

    /// Unsigned integer as a big-endian word. `u128` covers every amount
    /// and timestamp we carry; the top 16 bytes are always zero.
    pub fn uint(&mut self, value: u128) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; WORD_LENGTH - 16]);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn address(&mut self, value: &Address) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; WORD_LENGTH - ADDRESS_LENGTH]);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(&sha256(value.as_bytes()));
        self
    }

    /// Raw encoded bytes (type hash followed by words), before hashing.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> [u8; 32] {
        sha256(&self.buf)
    }
}
