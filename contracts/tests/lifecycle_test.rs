//! Integration tests for the loan lifecycle.
//!
//! Origination through repayment or default, with note transfers in
//! between, driven through the public engines the way a counterparty would.

mod common;

use chrono::Duration;
use common::{Harness, INTEREST, LOAN_SECONDS, PRINCIPAL};
use pledge_contracts::note_token::PromissoryNote;
use pledge_contracts::{LendingError, LoanLedger, LoanState};
use pledge_protocol::address::Address;

// ---------------------------------------------------------------------------
// Origination and repayment
// ---------------------------------------------------------------------------

#[test]
fn originate_then_repay() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;

    // Principal split between borrower and fee sink; collateral escrowed.
    assert_eq!(h.balance(h.borrower()), 98);
    assert_eq!(h.balance(h.fee_sink()), 2);
    assert_eq!(h.balance(h.lender()), 0);
    assert_eq!(h.balance(h.system.origination.address()), 0);
    assert_eq!(h.custodian(terms.collateral_id), Some(h.loan_core()));

    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");
    assert_eq!(loan.state, LoanState::Active);
    assert_eq!(h.system.borrower_note.owner_of(loan.borrower_note)?, h.borrower());
    assert_eq!(h.system.lender_note.owner_of(loan.lender_note)?, h.lender());
    assert_eq!(h.system.borrower_note.total_supply(), 1);
    assert_eq!(h.system.lender_note.total_supply(), 1);

    h.prepare_repayment(h.borrower());
    let repaid = h.system.repayment.repay(h.borrower(), loan.borrower_note)?;
    assert_eq!(repaid, loan_id);

    assert_eq!(h.balance(h.lender()), PRINCIPAL + INTEREST);
    assert_eq!(h.balance(h.borrower()), 0);
    assert_eq!(h.balance(h.loan_core()), 0);
    assert_eq!(h.owner(terms.collateral_id), Some(h.borrower()));
    assert_eq!(h.custodian(terms.collateral_id), None);
    assert!(!h.system.borrower_note.exists(loan.borrower_note));
    assert!(!h.system.lender_note.exists(loan.lender_note));
    assert_eq!(h.system.loan_core.loan_state(loan_id), Some(LoanState::Repaid));
    Ok(())
}

#[test]
fn anyone_may_repay_on_the_borrowers_behalf() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    let friend = Address::for_contract("friend");
    h.prepare_repayment(friend);
    h.system.repayment.repay(friend, loan.borrower_note)?;

    // Collateral still goes to the borrower-note holder, not the payer.
    assert_eq!(h.owner(terms.collateral_id), Some(h.borrower()));
    assert_eq!(h.balance(h.lender()), PRINCIPAL + INTEREST);
    Ok(())
}

#[test]
fn repayment_pays_the_current_lender_note_holder() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, _) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    let buyer = Address::for_contract("note-buyer");
    h.system
        .lender_note
        .transfer(h.lender(), loan.lender_note, buyer)?;

    h.prepare_repayment(h.borrower());
    h.system.repayment.repay(h.borrower(), loan.borrower_note)?;
    assert_eq!(h.balance(buyer), PRINCIPAL + INTEREST);
    assert_eq!(h.balance(h.lender()), 0);
    Ok(())
}

#[test]
fn repayment_returns_collateral_to_the_current_borrower_note_holder() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    let heir = Address::for_contract("heir");
    h.system
        .borrower_note
        .transfer(h.borrower(), loan.borrower_note, heir)?;

    h.prepare_repayment(h.borrower());
    h.system.repayment.repay(h.borrower(), loan.borrower_note)?;
    assert_eq!(h.owner(terms.collateral_id), Some(heir));
    Ok(())
}

#[test]
fn second_repay_fails() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, _) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    h.prepare_repayment(h.borrower());
    h.system.repayment.repay(h.borrower(), loan.borrower_note)?;

    h.prepare_repayment(h.borrower());
    let err = h
        .system
        .repayment
        .repay(h.borrower(), loan.borrower_note)
        .unwrap_err();
    assert!(matches!(
        err,
        LendingError::IllegalStateTransition {
            from: Some(LoanState::Repaid),
            to: LoanState::Repaid,
            ..
        }
    ));
    // No second payment went anywhere.
    assert_eq!(h.balance(h.lender()), PRINCIPAL + INTEREST);
    assert_eq!(h.balance(h.borrower()), PRINCIPAL + INTEREST);
    Ok(())
}

#[test]
fn unknown_borrower_note_is_invalid() {
    let h = Harness::new();
    assert_eq!(
        h.system.repayment.repay(h.borrower(), 99),
        Err(LendingError::InvalidNote(99))
    );
}

// ---------------------------------------------------------------------------
// Default and claim
// ---------------------------------------------------------------------------

#[test]
fn default_then_claim() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    h.clock.advance(Duration::seconds(LOAN_SECONDS + 1));
    let claimed = h.system.repayment.claim(h.lender(), loan.lender_note)?;
    assert_eq!(claimed, loan_id);

    assert_eq!(h.owner(terms.collateral_id), Some(h.lender()));
    assert_eq!(h.system.loan_core.loan_state(loan_id), Some(LoanState::Claimed));
    assert_eq!(h.system.borrower_note.total_supply(), 0);
    assert_eq!(h.system.lender_note.total_supply(), 0);

    // The borrower kept the disbursed principal; a late repay is refused.
    h.prepare_repayment(h.borrower());
    let err = h
        .system
        .repayment
        .repay(h.borrower(), loan.borrower_note)
        .unwrap_err();
    assert!(matches!(
        err,
        LendingError::IllegalStateTransition {
            from: Some(LoanState::Claimed),
            ..
        }
    ));
    assert_eq!(h.balance(h.lender()), 0);
    Ok(())
}

#[test]
fn claim_follows_the_transferred_lender_note() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    let buyer = Address::for_contract("note-buyer");
    h.system
        .lender_note
        .transfer(h.lender(), loan.lender_note, buyer)?;
    h.clock.advance(Duration::hours(2));

    assert_eq!(
        h.system.repayment.claim(h.lender(), loan.lender_note),
        Err(LendingError::OwnershipMismatch {
            note: loan.lender_note,
            caller: h.lender(),
        })
    );

    h.system.repayment.claim(buyer, loan.lender_note)?;
    assert_eq!(h.owner(terms.collateral_id), Some(buyer));
    Ok(())
}

#[test]
fn claim_before_due_date_is_refused() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, terms) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    let err = h
        .system
        .repayment
        .claim(h.lender(), loan.lender_note)
        .unwrap_err();
    assert!(matches!(err, LendingError::NotYetDefaulted { .. }));
    assert_eq!(h.custodian(terms.collateral_id), Some(h.loan_core()));
    Ok(())
}

#[test]
fn claim_before_due_date_is_refused_even_after_repayment() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, _) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    h.prepare_repayment(h.borrower());
    h.system.repayment.repay(h.borrower(), loan.borrower_note)?;

    let err = h
        .system
        .repayment
        .claim(h.lender(), loan.lender_note)
        .unwrap_err();
    assert!(matches!(err, LendingError::NotYetDefaulted { .. }));
    Ok(())
}

#[test]
fn second_claim_fails() -> anyhow::Result<()> {
    let h = Harness::new();
    let (loan_id, _) = h.originate()?;
    let loan = h.system.loan_core.loan(loan_id).expect("loan recorded");

    h.clock.advance(Duration::hours(2));
    h.system.repayment.claim(h.lender(), loan.lender_note)?;
    let err = h
        .system
        .repayment
        .claim(h.lender(), loan.lender_note)
        .unwrap_err();
    assert!(matches!(
        err,
        LendingError::IllegalStateTransition {
            from: Some(LoanState::Claimed),
            to: LoanState::Claimed,
            ..
        }
    ));
    Ok(())
}

#[test]
fn unknown_lender_note_is_invalid() {
    let h = Harness::new();
    assert_eq!(
        h.system.repayment.claim(h.lender(), 7),
        Err(LendingError::InvalidNote(7))
    );
}

// ---------------------------------------------------------------------------
// Several loans
// ---------------------------------------------------------------------------

#[test]
fn loans_are_independent() -> anyhow::Result<()> {
    let h = Harness::new();
    let (first, first_terms) = h.originate()?;
    let (second, second_terms) = h.originate()?;
    assert_ne!(first, second);
    assert_eq!(h.system.loan_core.loan_count(), 2);

    let first_loan = h.system.loan_core.loan(first).expect("first loan");
    let second_loan = h.system.loan_core.loan(second).expect("second loan");
    assert_eq!(h.system.borrower_note.notes_of(h.borrower()).len(), 2);

    h.prepare_repayment(h.borrower());
    h.system
        .repayment
        .repay(h.borrower(), first_loan.borrower_note)?;
    h.clock.advance(Duration::hours(2));
    h.system
        .repayment
        .claim(h.lender(), second_loan.lender_note)?;

    assert_eq!(h.owner(first_terms.collateral_id), Some(h.borrower()));
    assert_eq!(h.owner(second_terms.collateral_id), Some(h.lender()));
    assert_eq!(h.system.loan_core.loan_state(first), Some(LoanState::Repaid));
    assert_eq!(h.system.loan_core.loan_state(second), Some(LoanState::Claimed));
    Ok(())
}
