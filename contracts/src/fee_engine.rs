//! # Fee Engine
//!
//! Maps `(fee kind, amount, payer)` to a fee amount using a rule table that
//! can be changed without touching the loan state machine. All arithmetic
//! is integer basis points: `fee = amount * bps / 10_000`, rounded down.
//!
//! Rule updates and payer waivers are gated by the engine's `FeeAdmin`
//! role. Orchestrators only ever see the [`FeeController`] trait.

use parking_lot::RwLock;
use pledge_protocol::address::{Address, Amount};
use pledge_protocol::config::{ProtocolConfig, BASIS_POINTS_DENOMINATOR, ORIGINATION_FEE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::access::{Role, RoleRegistry};
use crate::error::{LendingError, LendingResult};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// How a fee is derived from the amount it is charged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeComputation {
    /// Rate in basis points of the amount.
    BasisPoints(u32),
    /// Flat fee, capped at the amount.
    Fixed(Amount),
}

/// Conditions under which a rule charges anything at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConstraints {
    /// Only charge in this currency.
    pub currency: Option<Address>,
    /// Only charge on amounts at or above this.
    pub min_amount: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRule {
    pub kind: String,
    pub computation: FeeComputation,
    #[serde(default)]
    pub constraints: FeeConstraints,
}

impl FeeRule {
    pub fn basis_points(kind: impl Into<String>, bps: u32) -> Self {
        Self {
            kind: kind.into(),
            computation: FeeComputation::BasisPoints(bps),
            constraints: FeeConstraints::default(),
        }
    }

    pub fn fixed(kind: impl Into<String>, amount: Amount) -> Self {
        Self {
            kind: kind.into(),
            computation: FeeComputation::Fixed(amount),
            constraints: FeeConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: FeeConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    fn applies(&self, amount: Amount, currency: Option<Address>) -> bool {
        if let Some(min) = self.constraints.min_amount {
            if amount < min {
                return false;
            }
        }
        match (self.constraints.currency, currency) {
            (Some(required), Some(actual)) => required == actual,
            _ => true,
        }
    }

    fn charge(&self, amount: Amount) -> LendingResult<Amount> {
        match self.computation {
            FeeComputation::BasisPoints(bps) => amount
                .checked_mul(bps as u128)
                .map(|scaled| scaled / BASIS_POINTS_DENOMINATOR)
                .ok_or(LendingError::AmountOverflow),
            FeeComputation::Fixed(flat) => Ok(flat.min(amount)),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller interface
// ---------------------------------------------------------------------------

pub trait FeeController: Send + Sync {
    /// Fee owed on `amount` under the rule for `kind`.
    fn compute_fee(&self, kind: &str, amount: Amount, payer: Address) -> LendingResult<Amount>;

    /// As [`compute_fee`](Self::compute_fee), also checking the rule's
    /// currency constraint against `currency`.
    fn compute_fee_in(
        &self,
        kind: &str,
        amount: Amount,
        payer: Address,
        currency: Address,
    ) -> LendingResult<Amount>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct FeeEngine {
    address: Address,
    roles: RoleRegistry,
    rules: RwLock<HashMap<String, FeeRule>>,
    waivers: RwLock<HashSet<Address>>,
}

impl FeeEngine {
    /// An engine with an empty rule table.
    pub fn new(address: Address, admin: Address) -> Self {
        Self {
            address,
            roles: RoleRegistry::new(admin),
            rules: RwLock::new(HashMap::new()),
            waivers: RwLock::new(HashSet::new()),
        }
    }

    /// An engine seeded with the origination fee from `config`.
    pub fn with_defaults(address: Address, admin: Address, config: &ProtocolConfig) -> Self {
        let engine = Self::new(address, admin);
        engine.rules.write().insert(
            ORIGINATION_FEE.to_string(),
            FeeRule::basis_points(ORIGINATION_FEE, config.origination_fee_bps),
        );
        engine
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn rule(&self, kind: &str) -> Option<FeeRule> {
        self.rules.read().get(kind).cloned()
    }

    /// Insert or replace the rule for `rule.kind`.
    pub fn set_rule(&self, caller: Address, rule: FeeRule) -> LendingResult<()> {
        self.roles.require(Role::FeeAdmin, caller)?;
        if let FeeComputation::BasisPoints(bps) = rule.computation {
            if bps as u128 > BASIS_POINTS_DENOMINATOR {
                return Err(LendingError::IllegalInput(format!(
                    "fee rate {bps} bps exceeds {BASIS_POINTS_DENOMINATOR}"
                )));
            }
        }
        if rule.kind.is_empty() {
            return Err(LendingError::IllegalInput("fee kind must be non-empty".into()));
        }
        tracing::info!(%caller, kind = %rule.kind, computation = ?rule.computation, "fee rule set");
        self.rules.write().insert(rule.kind.clone(), rule);
        Ok(())
    }

    pub fn remove_rule(&self, caller: Address, kind: &str) -> LendingResult<Option<FeeRule>> {
        self.roles.require(Role::FeeAdmin, caller)?;
        let removed = self.rules.write().remove(kind);
        tracing::info!(%caller, kind, removed = removed.is_some(), "fee rule removed");
        Ok(removed)
    }

    /// Exempt (or stop exempting) `payer` from every fee.
    pub fn set_waiver(&self, caller: Address, payer: Address, waived: bool) -> LendingResult<()> {
        self.roles.require(Role::FeeAdmin, caller)?;
        let mut waivers = self.waivers.write();
        if waived {
            waivers.insert(payer);
        } else {
            waivers.remove(&payer);
        }
        tracing::info!(%caller, %payer, waived, "fee waiver updated");
        Ok(())
    }

    fn quote(
        &self,
        kind: &str,
        amount: Amount,
        payer: Address,
        currency: Option<Address>,
    ) -> LendingResult<Amount> {
        let rule = self
            .rules
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| LendingError::UnsupportedFeeType(kind.to_string()))?;
        if amount == 0 {
            return Err(LendingError::InvalidAmount(amount));
        }
        if self.waivers.read().contains(&payer) || !rule.applies(amount, currency) {
            tracing::debug!(kind, amount, %payer, "fee not applicable");
            return Ok(0);
        }
        let fee = rule.charge(amount)?;
        tracing::debug!(kind, amount, fee, %payer, "fee quoted");
        Ok(fee)
    }
}

impl FeeController for FeeEngine {
    fn compute_fee(&self, kind: &str, amount: Amount, payer: Address) -> LendingResult<Amount> {
        self.quote(kind, amount, payer, None)
    }

    fn compute_fee_in(
        &self,
        kind: &str,
        amount: Amount,
        payer: Address,
        currency: Address,
    ) -> LendingResult<Amount> {
        self.quote(kind, amount, payer, Some(currency))
    }
}
