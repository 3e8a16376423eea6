//! # LoanCore
//!
//! The authoritative loan ledger. LoanCore owns every loan record and its
//! state machine, is the only principal allowed to mint or burn notes, and
//! is the custodian of all escrowed collateral and repayment funds.
//!
//! ```text
//!   create_loan           repay
//!  ─────────────▶ Active ───────▶ Repaid
//!                   │
//!                   │ claim (now > due_date)
//!                   ▼
//!                Claimed
//! ```
//!
//! `Created` exists only inside `create_loan` and is never observable from
//! outside. Records are never deleted.
//!
//! Settlement always pays the **current** note holders, looked up at the
//! moment of settlement, never the addresses that originated the loan.

use chrono::{DateTime, Utc};
use pledge_protocol::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::access::{PauseState, Role, RoleRegistry};
use crate::assets::collateral::{BundleId, CollateralCustody};
use crate::assets::currency::FungibleLedger;
use crate::atomic::{self, Checkpointed, Transactional};
use crate::clock::Clock;
use crate::error::{LendingError, LendingResult};
use crate::note_token::{NoteId, PromissoryNote};
use crate::terms::LoanTerms;

pub type LoanId = u64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanState {
    /// Record allocated, notes not yet minted. Never visible outside `create_loan`.
    Created,
    /// Collateral escrowed, both notes live.
    Active,
    /// Paid off; collateral returned to the borrower-note holder.
    Repaid,
    /// Defaulted; collateral seized by the lender-note holder.
    Claimed,
}

impl LoanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoanState::Repaid | LoanState::Claimed)
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanState::Created => write!(f, "Created"),
            LoanState::Active => write!(f, "Active"),
            LoanState::Repaid => write!(f, "Repaid"),
            LoanState::Claimed => write!(f, "Claimed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub terms: LoanTerms,
    pub state: LoanState,
    pub borrower_note: NoteId,
    pub lender_note: NoteId,
    pub created_at: DateTime<Utc>,
    /// Set when the loan reaches a terminal state.
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct LoanBook {
    loans: HashMap<LoanId, Loan>,
    borrower_note_loans: HashMap<NoteId, LoanId>,
    lender_note_loans: HashMap<NoteId, LoanId>,
    /// Bundles currently backing an `Active` loan.
    active_collateral: HashSet<BundleId>,
    next_loan_id: LoanId,
}

impl Default for LoanBook {
    fn default() -> Self {
        Self {
            loans: HashMap::new(),
            borrower_note_loans: HashMap::new(),
            lender_note_loans: HashMap::new(),
            active_collateral: HashSet::new(),
            next_loan_id: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// What the orchestrators need from the loan ledger.
pub trait LoanLedger: Transactional {
    /// LoanCore's own address: custodian of collateral and payoff funds.
    fn address(&self) -> Address;

    fn create_loan(
        &self,
        caller: Address,
        terms: LoanTerms,
        borrower: Address,
        lender: Address,
    ) -> LendingResult<LoanId>;

    fn repay(&self, caller: Address, loan_id: LoanId) -> LendingResult<()>;

    fn claim(&self, caller: Address, loan_id: LoanId) -> LendingResult<()>;

    fn loan(&self, loan_id: LoanId) -> Option<Loan>;

    fn loan_id_for_borrower_note(&self, note: NoteId) -> Option<LoanId>;

    fn loan_id_for_lender_note(&self, note: NoteId) -> Option<LoanId>;
}

// ---------------------------------------------------------------------------
// LoanCore
// ---------------------------------------------------------------------------

pub struct LoanCore {
    address: Address,
    book: Checkpointed<LoanBook>,
    roles: RoleRegistry,
    pause: PauseState,
    borrower_note: Arc<dyn PromissoryNote>,
    lender_note: Arc<dyn PromissoryNote>,
    currency: Arc<dyn FungibleLedger>,
    collateral: Arc<dyn CollateralCustody>,
    clock: Arc<dyn Clock>,
}

impl LoanCore {
    pub fn new(
        address: Address,
        admin: Address,
        borrower_note: Arc<dyn PromissoryNote>,
        lender_note: Arc<dyn PromissoryNote>,
        currency: Arc<dyn FungibleLedger>,
        collateral: Arc<dyn CollateralCustody>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            book: Checkpointed::new(LoanBook::default()),
            roles: RoleRegistry::new(admin),
            pause: PauseState::default(),
            borrower_note,
            lender_note,
            currency,
            collateral,
            clock,
        }
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn pause(&self, caller: Address) -> LendingResult<()> {
        self.pause.pause(&self.roles, caller)
    }

    pub fn unpause(&self, caller: Address) -> LendingResult<()> {
        self.pause.unpause(&self.roles, caller)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Number of loans ever created, in any state.
    pub fn loan_count(&self) -> usize {
        self.book.read().loans.len()
    }

    pub fn loan_state(&self, loan_id: LoanId) -> Option<LoanState> {
        self.book.read().loans.get(&loan_id).map(|l| l.state)
    }

    /// The loan, if it is `Active`; otherwise the transition to `to` is illegal.
    fn active_loan(&self, loan_id: LoanId, to: LoanState) -> LendingResult<Loan> {
        match self.book.read().loans.get(&loan_id) {
            Some(loan) if loan.state == LoanState::Active => Ok(loan.clone()),
            found => Err(LendingError::IllegalStateTransition {
                loan_id,
                from: found.map(|l| l.state),
                to,
            }),
        }
    }

    /// Burn both notes and mark the loan terminal.
    fn close(&self, loan: &Loan, to: LoanState) -> LendingResult<()> {
        self.borrower_note.burn(self.address, loan.borrower_note)?;
        self.lender_note.burn(self.address, loan.lender_note)?;

        let mut book = self.book.write();
        book.active_collateral.remove(&loan.terms.collateral_id);
        if let Some(record) = book.loans.get_mut(&loan.id) {
            record.state = to;
            record.closed_at = Some(self.clock.now());
        }
        Ok(())
    }
}

impl Transactional for LoanCore {
    fn begin(&self) {
        self.book.begin();
        self.borrower_note.begin();
        self.lender_note.begin();
    }

    fn commit(&self) {
        self.lender_note.commit();
        self.borrower_note.commit();
        self.book.commit();
    }

    fn rollback(&self) {
        self.lender_note.rollback();
        self.borrower_note.rollback();
        self.book.rollback();
    }
}

impl LoanLedger for LoanCore {
    fn address(&self) -> Address {
        self.address
    }

    fn create_loan(
        &self,
        caller: Address,
        terms: LoanTerms,
        borrower: Address,
        lender: Address,
    ) -> LendingResult<LoanId> {
        self.roles.require(Role::Originator, caller)?;
        self.pause.require_not_paused()?;

        if terms.principal == 0 {
            return Err(LendingError::IllegalInput("principal must be non-zero".into()));
        }
        let now = self.clock.unix_seconds();
        if terms.due_date <= now {
            return Err(LendingError::IllegalInput(format!(
                "due date {} is not after now ({})",
                terms.due_date, now
            )));
        }

        atomic::run(&[self], || {
            let bundle = terms.collateral_id;
            if self.book.read().active_collateral.contains(&bundle) {
                return Err(LendingError::IllegalInput(format!(
                    "collateral bundle {bundle} already backs an active loan"
                )));
            }
            if self.collateral.custodian_of(bundle) != Some(self.address) {
                return Err(LendingError::CollateralNotApproved(format!(
                    "bundle {bundle} is not in LoanCore custody"
                )));
            }

            let loan_id = {
                let mut book = self.book.write();
                let id = book.next_loan_id;
                book.next_loan_id += 1;
                book.loans.insert(
                    id,
                    Loan {
                        id,
                        terms: terms.clone(),
                        state: LoanState::Created,
                        borrower_note: 0,
                        lender_note: 0,
                        created_at: self.clock.now(),
                        closed_at: None,
                    },
                );
                id
            };

            let borrower_note = self.borrower_note.mint(self.address, borrower, loan_id)?;
            let lender_note = self.lender_note.mint(self.address, lender, loan_id)?;

            let mut book = self.book.write();
            book.borrower_note_loans.insert(borrower_note, loan_id);
            book.lender_note_loans.insert(lender_note, loan_id);
            book.active_collateral.insert(bundle);
            if let Some(loan) = book.loans.get_mut(&loan_id) {
                loan.borrower_note = borrower_note;
                loan.lender_note = lender_note;
                loan.state = LoanState::Active;
            }

            tracing::info!(
                loan_id,
                %borrower,
                %lender,
                principal = terms.principal,
                interest = terms.interest,
                due_date = terms.due_date,
                bundle,
                "loan created"
            );
            Ok(loan_id)
        })
    }

    fn repay(&self, caller: Address, loan_id: LoanId) -> LendingResult<()> {
        self.roles.require(Role::Repayer, caller)?;
        self.pause.require_not_paused()?;

        atomic::run(&[self, &self.currency, &self.collateral], || {
            let loan = self.active_loan(loan_id, LoanState::Repaid)?;
            let payoff = loan.terms.repayment_amount()?;
            let lender = self.lender_note.owner_of(loan.lender_note)?;
            let borrower = self.borrower_note.owner_of(loan.borrower_note)?;

            self.currency
                .transfer(loan.terms.payable_currency, self.address, lender, payoff)?;
            self.collateral
                .release(self.address, loan.terms.collateral_id, borrower)?;
            self.close(&loan, LoanState::Repaid)?;

            tracing::info!(loan_id, %borrower, %lender, payoff, "loan repaid");
            Ok(())
        })
    }

    fn claim(&self, caller: Address, loan_id: LoanId) -> LendingResult<()> {
        self.roles.require(Role::Repayer, caller)?;
        self.pause.require_not_paused()?;

        atomic::run(&[self, &self.collateral], || {
            let due_date = self
                .book
                .read()
                .loans
                .get(&loan_id)
                .map(|l| l.terms.due_date)
                .ok_or(LendingError::IllegalStateTransition {
                    loan_id,
                    from: None,
                    to: LoanState::Claimed,
                })?;
            let now = self.clock.unix_seconds();
            if now <= due_date {
                return Err(LendingError::NotYetDefaulted {
                    loan_id,
                    due_date,
                    now,
                });
            }

            let loan = self.active_loan(loan_id, LoanState::Claimed)?;
            let lender = self.lender_note.owner_of(loan.lender_note)?;
            self.collateral
                .release(self.address, loan.terms.collateral_id, lender)?;
            self.close(&loan, LoanState::Claimed)?;

            tracing::info!(loan_id, %lender, bundle = loan.terms.collateral_id, "collateral claimed");
            Ok(())
        })
    }

    fn loan(&self, loan_id: LoanId) -> Option<Loan> {
        self.book.read().loans.get(&loan_id).cloned()
    }

    fn loan_id_for_borrower_note(&self, note: NoteId) -> Option<LoanId> {
        self.book.read().borrower_note_loans.get(&note).copied()
    }

    fn loan_id_for_lender_note(&self, note: NoteId) -> Option<LoanId> {
        self.book.read().lender_note_loans.get(&note).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::collateral::InMemoryVault;
    use crate::assets::currency::InMemoryLedger;
    use crate::clock::ManualClock;
    use crate::note_token::{NoteKind, NoteToken};
    use chrono::Duration;

    struct Fixture {
        core: LoanCore,
        borrower_notes: Arc<NoteToken>,
        lender_notes: Arc<NoteToken>,
        ledger: Arc<InMemoryLedger>,
        vault: Arc<InMemoryVault>,
        clock: Arc<ManualClock>,
    }

    fn admin() -> Address {
        Address::for_contract("admin")
    }

    fn engine() -> Address {
        Address::for_contract("engine")
    }

    fn borrower() -> Address {
        Address::for_contract("borrower")
    }

    fn lender() -> Address {
        Address::for_contract("lender")
    }

    fn usd() -> Address {
        Address::for_contract("currency:usd")
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = Arc::new(InMemoryLedger::new());
        let vault = Arc::new(InMemoryVault::new(Address::for_contract("vault"), 1, clock.clone()));
        let borrower_notes = Arc::new(NoteToken::new(
            Address::for_contract("borrower-note"),
            NoteKind::Borrower,
            admin(),
        ));
        let lender_notes = Arc::new(NoteToken::new(
            Address::for_contract("lender-note"),
            NoteKind::Lender,
            admin(),
        ));
        let core = LoanCore::new(
            Address::for_contract("core"),
            admin(),
            borrower_notes.clone(),
            lender_notes.clone(),
            ledger.clone(),
            vault.clone(),
            clock.clone(),
        );
        for notes in [&borrower_notes, &lender_notes] {
            notes.roles().grant(admin(), Role::Minter, core.address()).unwrap();
            notes.roles().grant(admin(), Role::Burner, core.address()).unwrap();
        }
        core.roles().grant(admin(), Role::Originator, engine()).unwrap();
        core.roles().grant(admin(), Role::Repayer, engine()).unwrap();
        Fixture {
            core,
            borrower_notes,
            lender_notes,
            ledger,
            vault,
            clock,
        }
    }

    /// Escrow a fresh bundle with the core and return terms referencing it.
    fn escrowed_terms(f: &Fixture) -> LoanTerms {
        let bundle = f.vault.deposit(borrower());
        f.vault
            .lock(borrower(), bundle, borrower(), f.core.address())
            .unwrap();
        LoanTerms {
            due_date: f.clock.unix_seconds() + 3600,
            principal: 100,
            interest: 1,
            collateral_id: bundle,
            payable_currency: usd(),
        }
    }

    #[test]
    fn create_mints_both_notes() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms.clone(), borrower(), lender()).unwrap();
        let loan = f.core.loan(id).unwrap();
        assert_eq!(loan.state, LoanState::Active);
        assert_eq!(loan.terms, terms);
        assert_eq!(f.borrower_notes.owner_of(loan.borrower_note).unwrap(), borrower());
        assert_eq!(f.lender_notes.owner_of(loan.lender_note).unwrap(), lender());
        assert_eq!(f.core.loan_id_for_borrower_note(loan.borrower_note), Some(id));
        assert_eq!(f.core.loan_id_for_lender_note(loan.lender_note), Some(id));
        assert_eq!(f.core.loan_count(), 1);
    }

    #[test]
    fn create_requires_originator() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        assert!(matches!(
            f.core.create_loan(borrower(), terms, borrower(), lender()),
            Err(LendingError::Unauthorized { role: Role::Originator, .. })
        ));
    }

    #[test]
    fn create_rejects_malformed_terms() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let zero = LoanTerms { principal: 0, ..terms.clone() };
        assert!(matches!(
            f.core.create_loan(engine(), zero, borrower(), lender()),
            Err(LendingError::IllegalInput(_))
        ));
        let past = LoanTerms {
            due_date: f.clock.unix_seconds(),
            ..terms
        };
        assert!(matches!(
            f.core.create_loan(engine(), past, borrower(), lender()),
            Err(LendingError::IllegalInput(_))
        ));
        assert_eq!(f.core.loan_count(), 0);
    }

    #[test]
    fn create_requires_collateral_in_custody() {
        let f = fixture();
        let bundle = f.vault.deposit(borrower());
        let terms = LoanTerms {
            due_date: f.clock.unix_seconds() + 3600,
            principal: 100,
            interest: 1,
            collateral_id: bundle,
            payable_currency: usd(),
        };
        assert!(matches!(
            f.core.create_loan(engine(), terms, borrower(), lender()),
            Err(LendingError::CollateralNotApproved(_))
        ));
        assert_eq!(f.borrower_notes.total_supply(), 0);
    }

    #[test]
    fn collateral_cannot_back_two_loans() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        f.core.create_loan(engine(), terms.clone(), borrower(), lender()).unwrap();
        assert!(matches!(
            f.core.create_loan(engine(), terms, borrower(), lender()),
            Err(LendingError::IllegalInput(_))
        ));
        assert_eq!(f.lender_notes.total_supply(), 1);
    }

    #[test]
    fn repay_pays_current_holders() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms.clone(), borrower(), lender()).unwrap();
        let loan = f.core.loan(id).unwrap();

        let buyer = Address::for_contract("buyer");
        f.lender_notes.transfer(lender(), loan.lender_note, buyer).unwrap();
        f.ledger.mint(usd(), f.core.address(), 101).unwrap();

        f.core.repay(engine(), id).unwrap();
        assert_eq!(f.ledger.balance_of(usd(), buyer), 101);
        assert_eq!(f.ledger.balance_of(usd(), lender()), 0);
        assert_eq!(f.vault.owner_of(terms.collateral_id), Some(borrower()));
        assert!(!f.borrower_notes.exists(loan.borrower_note));
        assert!(!f.lender_notes.exists(loan.lender_note));
        let closed = f.core.loan(id).unwrap();
        assert_eq!(closed.state, LoanState::Repaid);
        assert!(closed.closed_at.is_some());
    }

    #[test]
    fn repay_without_funds_changes_nothing() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms.clone(), borrower(), lender()).unwrap();
        assert!(matches!(
            f.core.repay(engine(), id),
            Err(LendingError::Ledger(_))
        ));
        assert_eq!(f.core.loan_state(id), Some(LoanState::Active));
        assert_eq!(f.vault.custodian_of(terms.collateral_id), Some(f.core.address()));
        assert_eq!(f.lender_notes.total_supply(), 1);
    }

    #[test]
    fn second_repay_is_illegal() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms, borrower(), lender()).unwrap();
        f.ledger.mint(usd(), f.core.address(), 202).unwrap();
        f.core.repay(engine(), id).unwrap();
        assert_eq!(
            f.core.repay(engine(), id),
            Err(LendingError::IllegalStateTransition {
                loan_id: id,
                from: Some(LoanState::Repaid),
                to: LoanState::Repaid,
            })
        );
        assert_eq!(f.ledger.balance_of(usd(), lender()), 101);
    }

    #[test]
    fn repay_unknown_loan_is_illegal() {
        let f = fixture();
        assert_eq!(
            f.core.repay(engine(), 42),
            Err(LendingError::IllegalStateTransition {
                loan_id: 42,
                from: None,
                to: LoanState::Repaid,
            })
        );
    }

    #[test]
    fn claim_waits_for_due_date() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms.clone(), borrower(), lender()).unwrap();
        assert!(matches!(
            f.core.claim(engine(), id),
            Err(LendingError::NotYetDefaulted { .. })
        ));
        // Exactly at the due date is still not a default.
        f.clock.advance(Duration::seconds(3600));
        assert!(matches!(
            f.core.claim(engine(), id),
            Err(LendingError::NotYetDefaulted { .. })
        ));
        f.clock.advance(Duration::seconds(1));
        f.core.claim(engine(), id).unwrap();
        assert_eq!(f.core.loan_state(id), Some(LoanState::Claimed));
        assert_eq!(f.vault.owner_of(terms.collateral_id), Some(lender()));
    }

    #[test]
    fn claim_before_due_date_after_repay_is_not_defaulted() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms, borrower(), lender()).unwrap();
        f.ledger.mint(usd(), f.core.address(), 101).unwrap();
        f.core.repay(engine(), id).unwrap();
        assert!(matches!(
            f.core.claim(engine(), id),
            Err(LendingError::NotYetDefaulted { .. })
        ));
    }

    #[test]
    fn repay_after_claim_is_illegal() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms, borrower(), lender()).unwrap();
        f.clock.advance(Duration::hours(2));
        f.core.claim(engine(), id).unwrap();
        assert!(matches!(
            f.core.claim(engine(), id),
            Err(LendingError::IllegalStateTransition { from: Some(LoanState::Claimed), .. })
        ));
        assert!(matches!(
            f.core.repay(engine(), id),
            Err(LendingError::IllegalStateTransition { from: Some(LoanState::Claimed), .. })
        ));
    }

    #[test]
    fn settlement_requires_repayer() {
        let f = fixture();
        let terms = escrowed_terms(&f);
        let id = f.core.create_loan(engine(), terms, borrower(), lender()).unwrap();
        assert!(matches!(
            f.core.repay(lender(), id),
            Err(LendingError::Unauthorized { role: Role::Repayer, .. })
        ));
        assert!(matches!(
            f.core.claim(lender(), id),
            Err(LendingError::Unauthorized { role: Role::Repayer, .. })
        ));
    }

    #[test]
    fn pause_blocks_mutations() {
        let f = fixture();
        f.core.roles().grant(admin(), Role::Pauser, admin()).unwrap();
        let terms = escrowed_terms(&f);
        f.core.pause(admin()).unwrap();
        assert_eq!(
            f.core.create_loan(engine(), terms.clone(), borrower(), lender()),
            Err(LendingError::Paused)
        );
        f.core.unpause(admin()).unwrap();
        f.core.create_loan(engine(), terms, borrower(), lender()).unwrap();
    }
}
