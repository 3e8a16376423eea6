//! Error taxonomy of the settlement core.
//!
//! Every failure aborts the whole enclosing operation; see [`crate::atomic`]
//! for how partial effects are unwound. Nothing here is retried internally.

use pledge_protocol::address::Address;
use thiserror::Error;

use crate::access::Role;
use crate::assets::collateral::CustodyError;
use crate::assets::currency::LedgerError;
use crate::loan_core::{LoanId, LoanState};
use crate::note_token::NoteId;

/// Failures of the settlement core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LendingError {
    /// The terms signature did not recover to any address, or was already used.
    #[error("invalid signature")]
    InvalidSignature,

    /// Signer and submitter are not the declared borrower/lender pair.
    #[error("signer mismatch: {signer} and {submitter} are not the declared counterparties")]
    SignerMismatch {
        /// Address recovered from the terms signature.
        signer: Address,
        /// Caller who submitted the terms.
        submitter: Address,
    },

    /// The submitter signed their own terms.
    #[error("self-dealing: {0} both signed and submitted the terms")]
    SelfDealing(Address),

    /// The collateral bundle could not be escrowed.
    #[error("collateral not approved: {0}")]
    CollateralNotApproved(String),

    /// The lender's principal could not be pulled.
    #[error("payment not approved: {0}")]
    PaymentNotApproved(String),

    /// The collateral permit is malformed, stale, or not signed by the owner.
    #[error("invalid collateral permit: {0}")]
    InvalidPermit(String),

    /// The loan is not in a state that allows the requested transition.
    #[error("illegal state transition for loan {loan_id}: {from:?} -> {to:?}")]
    IllegalStateTransition {
        /// Loan the transition was attempted on.
        loan_id: LoanId,
        /// `None` when the loan was never created.
        from: Option<LoanState>,
        /// State the operation would have moved to.
        to: LoanState,
    },

    /// Collateral claimed at or before the due date.
    #[error("loan {loan_id} not yet defaulted: due at {due_date}, now {now}")]
    NotYetDefaulted {
        /// Loan being claimed.
        loan_id: LoanId,
        /// Due date from the loan terms (unix seconds).
        due_date: u64,
        /// Clock reading at the time of the claim.
        now: u64,
    },

    /// The note does not exist or maps to no loan.
    #[error("invalid note: {0}")]
    InvalidNote(NoteId),

    /// The caller does not hold the note that gates the operation.
    #[error("ownership mismatch: {caller} does not hold note {note}")]
    OwnershipMismatch {
        /// Note whose holder was expected.
        note: NoteId,
        /// Address that made the call.
        caller: Address,
    },

    /// The payer's allowance or balance does not cover the payoff.
    #[error("insufficient approval: {0}")]
    InsufficientApproval(String),

    /// No fee rule is configured for the requested kind.
    #[error("unsupported fee type: {0}")]
    UnsupportedFeeType(String),

    /// A fee was requested on an amount that cannot carry one.
    #[error("invalid amount: {0}")]
    InvalidAmount(u128),

    /// Malformed input: bad terms, zero addresses, reused collateral.
    #[error("illegal input: {0}")]
    IllegalInput(String),

    /// The caller lacks the role the operation requires.
    #[error("unauthorized: {principal} lacks role {role:?}")]
    Unauthorized {
        /// Address that made the call.
        principal: Address,
        /// Role the operation requires.
        role: Role,
    },

    /// The component is paused.
    #[error("contract is paused")]
    Paused,

    /// Checked arithmetic overflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// A currency movement the protocol itself initiated failed.
    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    /// A collateral movement the protocol itself initiated failed.
    #[error("custody failure: {0}")]
    Custody(#[from] CustodyError),
}

pub type LendingResult<T> = Result<T, LendingError>;
