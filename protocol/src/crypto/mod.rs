//! # Cryptographic Primitives for Pledge
//!
//! Everything that proves who agreed to what flows through here:
//!
//! - **Ed25519** keys and signatures (`keys`).
//! - **Recoverable signatures** that yield the signer's address (`signatures`).
//! - **Structured-message encoding** with domain separation (`typed_data`).
//! - **SHA-256 / BLAKE3** hashing (`hash`).
//!
//! Thin, type-safe wrappers around audited implementations. No home-grown
//! primitives.

pub mod hash;
pub mod keys;
pub mod signatures;
pub mod typed_data;

pub use hash::{blake3_hash, domain_separated_hash, sha256};
pub use keys::{PledgeKeypair, PledgePublicKey};
pub use signatures::{recover_typed, sign_typed, RecoverableSignature};
pub use typed_data::{TypedDataDomain, TypedStruct, WordEncoder};
