//! External asset collaborators.
//!
//! The settlement core moves money and collateral but does not own the
//! mechanisms that hold them. These traits are the whole contract between
//! the two sides; the in-memory implementations back tests and local
//! simulation.

pub mod collateral;
pub mod currency;

pub use collateral::{BundleId, CollateralCustody, CollateralPermit, CustodyError, InMemoryVault};
pub use currency::{FungibleLedger, InMemoryLedger, LedgerError};
