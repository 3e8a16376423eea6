//! # Repayment and Claims
//!
//! Settlement is addressed by note, not by loan: the caller names the note
//! they care about and the engine resolves it through LoanCore's
//! back-references.
//!
//! - `repay` may be called by anyone willing to pay. The payoff is pulled
//!   from the caller into LoanCore custody, and LoanCore pays it on to the
//!   current lender-note holder.
//! - `claim` may only be called by the current lender-note holder.

use pledge_protocol::address::Address;
use std::sync::Arc;

use crate::assets::currency::FungibleLedger;
use crate::atomic;
use crate::error::{LendingError, LendingResult};
use crate::loan_core::{Loan, LoanId, LoanLedger, LoanState};
use crate::note_token::{NoteId, PromissoryNote};

pub struct RepaymentEngine {
    address: Address,
    loan_core: Arc<dyn LoanLedger>,
    lender_note: Arc<dyn PromissoryNote>,
    currency: Arc<dyn FungibleLedger>,
}

impl RepaymentEngine {
    pub fn new(
        address: Address,
        loan_core: Arc<dyn LoanLedger>,
        lender_note: Arc<dyn PromissoryNote>,
        currency: Arc<dyn FungibleLedger>,
    ) -> Self {
        Self {
            address,
            loan_core,
            lender_note,
            currency,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Pay off the loan behind `borrower_note`. The caller must have
    /// approved this engine for `principal + interest` in the loan's
    /// currency.
    pub fn repay(&self, caller: Address, borrower_note: NoteId) -> LendingResult<LoanId> {
        let loan_id = self
            .loan_core
            .loan_id_for_borrower_note(borrower_note)
            .ok_or(LendingError::InvalidNote(borrower_note))?;
        let loan = self.settleable(loan_id, LoanState::Repaid)?;
        let payoff = loan.terms.repayment_amount()?;

        atomic::run(&[&self.currency, &self.loan_core], || {
            self.currency
                .transfer_from(
                    self.address,
                    loan.terms.payable_currency,
                    caller,
                    self.loan_core.address(),
                    payoff,
                )
                .map_err(|e| LendingError::InsufficientApproval(e.to_string()))?;
            tracing::debug!(loan_id, %caller, payoff, "payoff pulled");

            self.loan_core.repay(self.address, loan_id)
        })?;
        Ok(loan_id)
    }

    /// Seize the collateral behind `lender_note` after its due date.
    pub fn claim(&self, caller: Address, lender_note: NoteId) -> LendingResult<LoanId> {
        let loan_id = self
            .loan_core
            .loan_id_for_lender_note(lender_note)
            .ok_or(LendingError::InvalidNote(lender_note))?;

        // Terminated loans have no live note; let LoanCore report why.
        if self.loan_core.loan(loan_id).map(|l| l.state) == Some(LoanState::Active) {
            let holder = self.lender_note.owner_of(lender_note)?;
            if holder != caller {
                tracing::warn!(loan_id, %caller, %holder, "claim by non-holder");
                return Err(LendingError::OwnershipMismatch {
                    note: lender_note,
                    caller,
                });
            }
        }

        atomic::run(&[&self.loan_core], || {
            self.loan_core.claim(self.address, loan_id)
        })?;
        Ok(loan_id)
    }

    fn settleable(&self, loan_id: LoanId, to: LoanState) -> LendingResult<Loan> {
        match self.loan_core.loan(loan_id) {
            Some(loan) if loan.state == LoanState::Active => Ok(loan),
            found => Err(LendingError::IllegalStateTransition {
                loan_id,
                from: found.map(|l| l.state),
                to,
            }),
        }
    }
}
