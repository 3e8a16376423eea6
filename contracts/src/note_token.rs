//! # Promissory Note Tokens
//!
//! Each loan is represented by two transferable notes: one for the borrower
//! side, one for the lender side. Whoever holds a note *now* holds the
//! corresponding settlement rights, so notes can be sold.
//!
//! A [`NoteToken`] is composed from three independent parts:
//!
//! - an [`OwnershipLedger`] (owners, per-owner enumeration, note→loan
//!   back-references, the id counter),
//! - a [`RoleRegistry`] (`Minter` and `Burner` go to LoanCore),
//! - a [`PauseState`] that freezes transfers.
//!
//! Mint and burn ignore the pause switch; LoanCore must always be able to
//! close a loan.

use pledge_protocol::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::access::{PauseState, Role, RoleRegistry};
use crate::atomic::{Checkpointed, Transactional};
use crate::error::{LendingError, LendingResult};
use crate::loan_core::LoanId;

pub type NoteId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteKind {
    Borrower,
    Lender,
}

impl std::fmt::Display for NoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteKind::Borrower => write!(f, "borrower"),
            NoteKind::Lender => write!(f, "lender"),
        }
    }
}

/// Owner bookkeeping for one note kind.
#[derive(Debug, Clone)]
pub struct OwnershipLedger {
    owners: HashMap<NoteId, Address>,
    loans: HashMap<NoteId, LoanId>,
    holdings: HashMap<Address, BTreeSet<NoteId>>,
    approvals: HashMap<NoteId, Address>,
    next_id: NoteId,
}

impl Default for OwnershipLedger {
    fn default() -> Self {
        Self {
            owners: HashMap::new(),
            loans: HashMap::new(),
            holdings: HashMap::new(),
            approvals: HashMap::new(),
            next_id: 1,
        }
    }
}

impl OwnershipLedger {
    fn issue(&mut self, to: Address, loan_id: LoanId) -> NoteId {
        let id = self.next_id;
        self.next_id += 1;
        self.owners.insert(id, to);
        self.loans.insert(id, loan_id);
        self.holdings.entry(to).or_default().insert(id);
        id
    }

    fn retire(&mut self, note: NoteId) -> Option<Address> {
        let owner = self.owners.remove(&note)?;
        self.loans.remove(&note);
        self.approvals.remove(&note);
        self.drop_holding(owner, note);
        Some(owner)
    }

    fn reassign(&mut self, note: NoteId, from: Address, to: Address) {
        self.drop_holding(from, note);
        self.owners.insert(note, to);
        self.approvals.remove(&note);
        self.holdings.entry(to).or_default().insert(note);
    }

    fn drop_holding(&mut self, owner: Address, note: NoteId) {
        if let Some(held) = self.holdings.get_mut(&owner) {
            held.remove(&note);
            if held.is_empty() {
                self.holdings.remove(&owner);
            }
        }
    }
}

/// Ownership-token ledger capability, one instance per [`NoteKind`].
pub trait PromissoryNote: Transactional {
    fn kind(&self) -> NoteKind;

    /// Issue a note for `loan_id` to `to`. Requires `Minter`.
    fn mint(&self, caller: Address, to: Address, loan_id: LoanId) -> LendingResult<NoteId>;

    /// Destroy `note`. Requires `Burner`.
    fn burn(&self, caller: Address, note: NoteId) -> LendingResult<()>;

    fn owner_of(&self, note: NoteId) -> LendingResult<Address>;

    fn loan_of(&self, note: NoteId) -> LendingResult<LoanId>;

    /// Move `note` to `to`. `caller` must own it or be approved for it.
    fn transfer(&self, caller: Address, note: NoteId, to: Address) -> LendingResult<()>;

    /// Let `operator` transfer `note` once. Owner only.
    fn approve(&self, caller: Address, operator: Address, note: NoteId) -> LendingResult<()>;

    fn exists(&self, note: NoteId) -> bool;

    fn balance_of(&self, owner: Address) -> usize;

    /// Notes held by `owner`, ascending.
    fn notes_of(&self, owner: Address) -> Vec<NoteId>;

    fn total_supply(&self) -> usize;
}

pub struct NoteToken {
    address: Address,
    kind: NoteKind,
    ledger: Checkpointed<OwnershipLedger>,
    roles: RoleRegistry,
    pause: PauseState,
}

impl NoteToken {
    pub fn new(address: Address, kind: NoteKind, admin: Address) -> Self {
        Self {
            address,
            kind,
            ledger: Checkpointed::new(OwnershipLedger::default()),
            roles: RoleRegistry::new(admin),
            pause: PauseState::default(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
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
}

impl Transactional for NoteToken {
    fn begin(&self) {
        self.ledger.begin();
    }

    fn commit(&self) {
        self.ledger.commit();
    }

    fn rollback(&self) {
        self.ledger.rollback();
    }
}

impl PromissoryNote for NoteToken {
    fn kind(&self) -> NoteKind {
        self.kind
    }

    fn mint(&self, caller: Address, to: Address, loan_id: LoanId) -> LendingResult<NoteId> {
        self.roles.require(Role::Minter, caller)?;
        if to.is_zero() {
            return Err(LendingError::IllegalInput(format!(
                "cannot mint {} note to the zero address",
                self.kind
            )));
        }
        let id = self.ledger.write().issue(to, loan_id);
        tracing::debug!(kind = %self.kind, note = id, loan_id, %to, "note minted");
        Ok(id)
    }

    fn burn(&self, caller: Address, note: NoteId) -> LendingResult<()> {
        self.roles.require(Role::Burner, caller)?;
        let owner = self
            .ledger
            .write()
            .retire(note)
            .ok_or(LendingError::InvalidNote(note))?;
        tracing::debug!(kind = %self.kind, note, %owner, "note burned");
        Ok(())
    }

    fn owner_of(&self, note: NoteId) -> LendingResult<Address> {
        self.ledger
            .read()
            .owners
            .get(&note)
            .copied()
            .ok_or(LendingError::InvalidNote(note))
    }

    fn loan_of(&self, note: NoteId) -> LendingResult<LoanId> {
        self.ledger
            .read()
            .loans
            .get(&note)
            .copied()
            .ok_or(LendingError::InvalidNote(note))
    }

    fn transfer(&self, caller: Address, note: NoteId, to: Address) -> LendingResult<()> {
        self.pause.require_not_paused()?;
        if to.is_zero() {
            return Err(LendingError::IllegalInput(
                "cannot transfer a note to the zero address".into(),
            ));
        }
        let mut ledger = self.ledger.write();
        let owner = ledger
            .owners
            .get(&note)
            .copied()
            .ok_or(LendingError::InvalidNote(note))?;
        let approved = ledger.approvals.get(&note) == Some(&caller);
        if caller != owner && !approved {
            return Err(LendingError::OwnershipMismatch { note, caller });
        }
        ledger.reassign(note, owner, to);
        tracing::info!(kind = %self.kind, note, from = %owner, %to, "note transferred");
        Ok(())
    }

    fn approve(&self, caller: Address, operator: Address, note: NoteId) -> LendingResult<()> {
        let mut ledger = self.ledger.write();
        let owner = ledger
            .owners
            .get(&note)
            .copied()
            .ok_or(LendingError::InvalidNote(note))?;
        if caller != owner {
            return Err(LendingError::OwnershipMismatch { note, caller });
        }
        ledger.approvals.insert(note, operator);
        Ok(())
    }

    fn exists(&self, note: NoteId) -> bool {
        self.ledger.read().owners.contains_key(&note)
    }

    fn balance_of(&self, owner: Address) -> usize {
        self.ledger.read().holdings.get(&owner).map_or(0, BTreeSet::len)
    }

    fn notes_of(&self, owner: Address) -> Vec<NoteId> {
        self.ledger
            .read()
            .holdings
            .get(&owner)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default()
    }

    fn total_supply(&self) -> usize {
        self.ledger.read().owners.len()
    }
}
