//! # Fungible Currency Ledger
//!
//! The payable currencies (principal, interest, fees) live outside the
//! settlement core. The core only needs `transferFrom` semantics: move
//! `amount` from `owner` to `recipient` on behalf of a `spender` the owner
//! has approved, or fail without moving anything.
//!
//! [`InMemoryLedger`] is the reference implementation: a multi-currency
//! balance table keyed by `(currency, holder)` with ERC-20 style
//! allowances. Every balance change is checked arithmetic.

use pledge_protocol::address::{Address, Amount};
use std::collections::HashMap;
use thiserror::Error;

use crate::atomic::{Checkpointed, Transactional};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {owner} holds {balance} of {currency}, needs {required}")]
    InsufficientBalance {
        currency: Address,
        owner: Address,
        balance: Amount,
        required: Amount,
    },

    #[error("insufficient allowance: {spender} may move {allowance} of {owner}'s {currency}, needs {required}")]
    InsufficientAllowance {
        currency: Address,
        owner: Address,
        spender: Address,
        allowance: Amount,
        required: Amount,
    },

    #[error("cannot transfer to the zero address")]
    ZeroRecipient,

    #[error("balance overflow")]
    Overflow,
}

/// Fungible-balance transfer capability consumed by the settlement core.
pub trait FungibleLedger: Transactional {
    /// Move `amount` of `currency` from `owner` to `recipient`, spending
    /// `spender`'s allowance. A spender moving its own funds needs none.
    fn transfer_from(
        &self,
        spender: Address,
        currency: Address,
        owner: Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Move the calling contract's own funds.
    fn transfer(
        &self,
        currency: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.transfer_from(from, currency, from, to, amount)
    }

    fn balance_of(&self, currency: Address, holder: Address) -> Amount;

    fn allowance(&self, currency: Address, owner: Address, spender: Address) -> Amount;
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    balances: HashMap<(Address, Address), Amount>,
    allowances: HashMap<(Address, Address, Address), Amount>,
    supply: HashMap<Address, Amount>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Checkpointed<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `to` with freshly issued currency. Test and bootstrap helper.
    pub fn mint(&self, currency: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroRecipient);
        }
        let mut state = self.state.write();
        let supply = state.supply.entry(currency).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(LedgerError::Overflow)?;
        let balance = state.balances.entry((currency, to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Set (not add to) `spender`'s allowance over `owner`'s `currency`.
    pub fn approve(&self, currency: Address, owner: Address, spender: Address, amount: Amount) {
        let mut state = self.state.write();
        if amount == 0 {
            state.allowances.remove(&(currency, owner, spender));
        } else {
            state.allowances.insert((currency, owner, spender), amount);
        }
    }

    pub fn total_supply(&self, currency: Address) -> Amount {
        self.state.read().supply.get(&currency).copied().unwrap_or(0)
    }
}

impl Transactional for InMemoryLedger {
    fn begin(&self) {
        self.state.begin();
    }

    fn commit(&self) {
        self.state.commit();
    }

    fn rollback(&self) {
        self.state.rollback();
    }
}

impl FungibleLedger for InMemoryLedger {
    fn transfer_from(
        &self,
        spender: Address,
        currency: Address,
        owner: Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if recipient.is_zero() {
            return Err(LedgerError::ZeroRecipient);
        }
        let mut state = self.state.write();

        // Validate everything before touching anything.
        let balance = state.balances.get(&(currency, owner)).copied().unwrap_or(0);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                currency,
                owner,
                balance,
                required: amount,
            });
        }
        let remaining_allowance = if spender == owner {
            None
        } else {
            let allowance = state
                .allowances
                .get(&(currency, owner, spender))
                .copied()
                .unwrap_or(0);
            if allowance < amount {
                return Err(LedgerError::InsufficientAllowance {
                    currency,
                    owner,
                    spender,
                    allowance,
                    required: amount,
                });
            }
            Some(allowance - amount)
        };
        if owner != recipient {
            let recipient_balance = state.balances.get(&(currency, recipient)).copied().unwrap_or(0);
            let credited = recipient_balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
            state.balances.insert((currency, owner), balance - amount);
            state.balances.insert((currency, recipient), credited);
        }

        match remaining_allowance {
            Some(0) => {
                state.allowances.remove(&(currency, owner, spender));
            }
            Some(left) => {
                state.allowances.insert((currency, owner, spender), left);
            }
            None => {}
        }
        Ok(())
    }

    fn balance_of(&self, currency: Address, holder: Address) -> Amount {
        self.state
            .read()
            .balances
            .get(&(currency, holder))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, currency: Address, owner: Address, spender: Address) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(currency, owner, spender))
            .copied()
            .unwrap_or(0)
    }
}
