//! # Recoverable Signatures
//!
//! Loan terms travel with a `(v, r, s)` triple from which the verifier
//! recovers the signer's address, instead of being told who signed.
//!
//! Ed25519 cannot recover a public key from `(R, S)` alone, so the triple
//! carries the verifying key as its recovery component:
//!
//! - `v`: the signer's 32-byte Ed25519 verifying key
//! - `r`: the signature's `R` point
//! - `s`: the signature's `S` scalar
//!
//! Recovery means: verify `r ‖ s` over the digest under `v`, then derive the
//! address from `v`. A triple that doesn't verify recovers to nothing. Any
//! tampering with `v` moves the recovered address, and the caller's
//! counterparty check rejects it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::config::SIGNATURE_LENGTH;
use crate::crypto::keys::{PledgeKeypair, PledgePublicKey};
use crate::crypto::typed_data::{TypedDataDomain, TypedStruct};

/// Errors during signature recovery.
///
/// Callers never learn *why* recovery failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature recovery failed")]
    RecoveryFailed,
}

/// A signature that carries enough to recover its signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    pub v: [u8; 32],
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl RecoverableSignature {
    /// Signs an arbitrary 32-byte digest.
    pub fn sign_digest(keypair: &PledgeKeypair, digest: &[u8; 32]) -> Self {
        let sig = keypair.sign(digest);
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig[..32]);
        s.copy_from_slice(&sig[32..]);
        Self {
            v: *keypair.public_key().as_bytes(),
            r,
            s,
        }
    }

    /// Recovers the address that signed `digest`.
    pub fn recover(&self, digest: &[u8; 32]) -> Result<Address, SignatureError> {
        let public_key =
            PledgePublicKey::try_from_slice(&self.v).map_err(|_| SignatureError::RecoveryFailed)?;
        let mut sig = [0u8; SIGNATURE_LENGTH];
        sig[..32].copy_from_slice(&self.r);
        sig[32..].copy_from_slice(&self.s);
        if !public_key.verify(digest, &sig) {
            return Err(SignatureError::RecoveryFailed);
        }
        Ok(public_key.address())
    }

    /// 96-byte wire form `v ‖ r ‖ s`.
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[..32].copy_from_slice(&self.v);
        out[32..64].copy_from_slice(&self.r);
        out[64..].copy_from_slice(&self.s);
        out
    }

    pub fn from_bytes(bytes: &[u8; 96]) -> Self {
        let mut v = [0u8; 32];
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        v.copy_from_slice(&bytes[..32]);
        r.copy_from_slice(&bytes[32..64]);
        s.copy_from_slice(&bytes[64..]);
        Self { v, r, s }
    }
}

/// Signs a structured message under `domain`.
///
/// # Example
///
/// ```
/// use pledge_protocol::address::Address;
/// use pledge_protocol::crypto::keys::PledgeKeypair;
/// use pledge_protocol::crypto::signatures::{recover_typed, sign_typed};
/// use pledge_protocol::crypto::typed_data::{TypedDataDomain, TypedStruct, WordEncoder};
///
/// struct Ping { n: u128 }
/// impl TypedStruct for Ping {
///     const TYPE: &'static str = "Ping(uint256 n)";
///     fn encode_fields(&self, e: &mut WordEncoder) { e.uint(self.n); }
/// }
///
/// let domain = TypedDataDomain::new("Demo", "1", 1, Address::for_contract("demo"));
/// let kp = PledgeKeypair::generate();
/// let sig = sign_typed(&kp, &domain, &Ping { n: 3 });
/// assert_eq!(recover_typed(&domain, &Ping { n: 3 }, &sig).unwrap(), kp.address());
/// ```
pub fn sign_typed<T: TypedStruct>(
    keypair: &PledgeKeypair,
    domain: &TypedDataDomain,
    message: &T,
) -> RecoverableSignature {
    RecoverableSignature::sign_digest(keypair, &domain.digest(message))
}

/// Recovers the signer of a structured message under `domain`.
pub fn recover_typed<T: TypedStruct>(
    domain: &TypedDataDomain,
    message: &T,
    signature: &RecoverableSignature,
) -> Result<Address, SignatureError> {
    signature.recover(&domain.digest(message))
}
