// Copyright (c) 2026 Pledge Protocol Contributors. MIT License.
// See LICENSE for details.

//! # Pledge Protocol Primitives
//!
//! The shared vocabulary of the Pledge lending contracts: who someone is
//! ([`address::Address`]), how much something is worth ([`address::Amount`]),
//! how two strangers prove they agreed on loan terms without trusting each
//! other (`crypto`), and the knobs a deployment can turn (`config`).
//!
//! ## Modules
//!
//! - **address**: 20-byte identities and integer amounts.
//! - **crypto**: Ed25519 keys, recoverable signatures, structured-message
//!   encoding with domain separation.
//! - **config**: protocol constants and per-deployment configuration.
//! - **logging**: `tracing` subscriber setup.
//!
//! ## Design Philosophy
//!
//! 1. Money is an integer. Always.
//! 2. A signature is only meaningful inside its domain.
//! 3. If it touches money, it has tests. Plural.

pub mod address;
pub mod config;
pub mod crypto;
pub mod logging;

pub use address::{Address, Amount};
