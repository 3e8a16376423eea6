//! # Pledge Settlement Contracts
//!
//! The settlement core of a peer-to-peer collateralized lending protocol.
//! A borrower and a lender agree on terms off-channel; one signs, the
//! other submits. In a single atomic step the system escrows the
//! collateral, moves the principal, and issues two transferable notes.
//! From then on the notes, not the original signers, decide who gets paid
//! and who may seize collateral.
//!
//! - **Authorizer**: bilateral signature check, no self-dealing.
//! - **FeeEngine**: basis-point fee rules behind a capability gate.
//! - **NoteToken**: borrower and lender claim tokens.
//! - **LoanCore**: the loan ledger and its state machine; sole custodian.
//! - **OriginationEngine** / **RepaymentEngine**: the two orchestrators.
//!
//! ## Design Principles
//!
//! 1. All monetary arithmetic is checked integer arithmetic.
//! 2. State transitions are explicit enum variants, checked before any effect.
//! 3. Every privileged operation checks an explicit capability first.
//! 4. An operation either completes entirely or leaves no trace
//!    (see [`atomic`]).

pub mod access;
pub mod assets;
pub mod atomic;
pub mod authorizer;
pub mod clock;
pub mod error;
pub mod fee_engine;
pub mod loan_core;
pub mod note_token;
pub mod origination;
pub mod repayment;
pub mod system;
pub mod terms;

pub use error::{LendingError, LendingResult};
pub use loan_core::{Loan, LoanCore, LoanId, LoanLedger, LoanState};
pub use system::LendingSystem;
pub use terms::LoanTerms;
