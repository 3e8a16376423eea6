//! # Collateral Custody
//!
//! Collateral is a *bundle*: one non-fungible reference standing for
//! whatever assets the borrower pledged. The settlement core never looks
//! inside a bundle. It needs exactly three things from custody:
//!
//! - `lock`: move a bundle from its owner into a custodian's escrow, on
//!   behalf of an operator the owner approved;
//! - `release`: the custodian hands the bundle to someone;
//! - `permit`: an owner's signature that approves an operator in the same
//!   call that uses the approval, so there is no separate approve step.
//!
//! [`InMemoryVault`] is the reference implementation.

use pledge_protocol::address::Address;
use pledge_protocol::config::{DOMAIN_VERSION, PERMIT_DOMAIN_NAME};
use pledge_protocol::crypto::signatures::{recover_typed, RecoverableSignature};
use pledge_protocol::crypto::typed_data::{TypedDataDomain, TypedStruct, WordEncoder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::atomic::{Checkpointed, Transactional};
use crate::clock::Clock;

/// Reference to a collateral bundle (`uint256` in signed terms).
pub type BundleId = u128;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CustodyError {
    #[error("unknown collateral bundle {0}")]
    UnknownBundle(BundleId),

    #[error("bundle {bundle} is owned by {owner}, not {claimed}")]
    NotOwner {
        bundle: BundleId,
        owner: Address,
        claimed: Address,
    },

    #[error("operator {operator} is not approved for bundle {bundle}")]
    NotApproved { bundle: BundleId, operator: Address },

    #[error("bundle {0} is already in escrow")]
    AlreadyEscrowed(BundleId),

    #[error("bundle {bundle} is not held in escrow by {caller}")]
    NotCustodian { bundle: BundleId, caller: Address },

    #[error("permit rejected: {0}")]
    PermitRejected(String),

    #[error("cannot release to the zero address")]
    ZeroRecipient,
}

/// Signed approval of `operator` over one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPermit {
    pub owner: Address,
    pub operator: Address,
    pub bundle: BundleId,
    /// Must equal the owner's current permit nonce; consumed on use.
    pub nonce: u64,
    /// Unix seconds after which the permit is dead.
    pub deadline: u64,
}

impl TypedStruct for CollateralPermit {
    const TYPE: &'static str = "CollateralPermit(address owner,address operator,uint256 collateralReference,uint256 nonce,uint256 deadline)";

    fn encode_fields(&self, encoder: &mut WordEncoder) {
        encoder
            .address(&self.owner)
            .address(&self.operator)
            .uint(self.bundle)
            .uint(self.nonce as u128)
            .uint(self.deadline as u128);
    }
}

/// Non-fungible collateral custody capability consumed by the settlement core.
pub trait CollateralCustody: Transactional {
    /// Move `bundle` from `from` into `custodian`'s escrow. `operator` must
    /// be `from` itself or approved by `from`.
    fn lock(
        &self,
        operator: Address,
        bundle: BundleId,
        from: Address,
        custodian: Address,
    ) -> Result<(), CustodyError>;

    /// Custodian hands an escrowed bundle to `to`.
    fn release(&self, caller: Address, bundle: BundleId, to: Address) -> Result<(), CustodyError>;

    /// Who holds `bundle` in escrow, if anyone.
    fn custodian_of(&self, bundle: BundleId) -> Option<Address>;

    /// Current owner of a bundle that is not in escrow.
    fn owner_of(&self, bundle: BundleId) -> Option<Address>;

    /// Apply a signed permit, approving its operator for its bundle.
    fn permit(
        &self,
        permit: &CollateralPermit,
        signature: &RecoverableSignature,
    ) -> Result<(), CustodyError>;
}

#[derive(Debug, Clone)]
struct BundleRecord {
    owner: Address,
    approved: Option<Address>,
    custodian: Option<Address>,
}

#[derive(Debug, Clone, Default)]
struct VaultState {
    bundles: HashMap<BundleId, BundleRecord>,
    operators: HashSet<(Address, Address)>,
    nonces: HashMap<Address, u64>,
    next_bundle: BundleId,
}

pub struct InMemoryVault {
    address: Address,
    domain: TypedDataDomain,
    clock: Arc<dyn Clock>,
    state: Checkpointed<VaultState>,
}

impl InMemoryVault {
    pub fn new(address: Address, network_id: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            domain: TypedDataDomain::new(PERMIT_DOMAIN_NAME, DOMAIN_VERSION, network_id, address),
            clock,
            state: Checkpointed::new(VaultState {
                next_bundle: 1,
                ..Default::default()
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Domain permits must be signed under.
    pub fn domain(&self) -> &TypedDataDomain {
        &self.domain
    }

    /// Register a new bundle owned by `owner` and return its reference.
    pub fn deposit(&self, owner: Address) -> BundleId {
        let mut state = self.state.write();
        let id = state.next_bundle;
        state.next_bundle += 1;
        state.bundles.insert(
            id,
            BundleRecord {
                owner,
                approved: None,
                custodian: None,
            },
        );
        id
    }

    /// Single-bundle approval by its owner.
    pub fn approve(
        &self,
        owner: Address,
        operator: Address,
        bundle: BundleId,
    ) -> Result<(), CustodyError> {
        let mut state = self.state.write();
        let record = state
            .bundles
            .get_mut(&bundle)
            .ok_or(CustodyError::UnknownBundle(bundle))?;
        if record.custodian.is_some() {
            return Err(CustodyError::AlreadyEscrowed(bundle));
        }
        if record.owner != owner {
            return Err(CustodyError::NotOwner {
                bundle,
                owner: record.owner,
                claimed: owner,
            });
        }
        record.approved = Some(operator);
        Ok(())
    }

    /// Approve or revoke `operator` for every bundle `owner` holds.
    pub fn set_approval_for_all(&self, owner: Address, operator: Address, approved: bool) {
        let mut state = self.state.write();
        if approved {
            state.operators.insert((owner, operator));
        } else {
            state.operators.remove(&(owner, operator));
        }
    }

    /// Next permit nonce expected from `owner`.
    pub fn nonce(&self, owner: Address) -> u64 {
        self.state.read().nonces.get(&owner).copied().unwrap_or(0)
    }
}

impl Transactional for InMemoryVault {
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

impl CollateralCustody for InMemoryVault {
    fn lock(
        &self,
        operator: Address,
        bundle: BundleId,
        from: Address,
        custodian: Address,
    ) -> Result<(), CustodyError> {
        let mut state = self.state.write();
        let approved_for_all = state.operators.contains(&(from, operator));
        let record = state
            .bundles
            .get_mut(&bundle)
            .ok_or(CustodyError::UnknownBundle(bundle))?;
        if record.custodian.is_some() {
            return Err(CustodyError::AlreadyEscrowed(bundle));
        }
        if record.owner != from {
            return Err(CustodyError::NotOwner {
                bundle,
                owner: record.owner,
                claimed: from,
            });
        }
        let authorized = operator == from || record.approved == Some(operator) || approved_for_all;
        if !authorized {
            return Err(CustodyError::NotApproved { bundle, operator });
        }
        record.custodian = Some(custodian);
        record.approved = None;
        tracing::debug!(bundle, %from, %custodian, "collateral locked");
        Ok(())
    }

    fn release(&self, caller: Address, bundle: BundleId, to: Address) -> Result<(), CustodyError> {
        if to.is_zero() {
            return Err(CustodyError::ZeroRecipient);
        }
        let mut state = self.state.write();
        let record = state
            .bundles
            .get_mut(&bundle)
            .ok_or(CustodyError::UnknownBundle(bundle))?;
        if record.custodian != Some(caller) {
            return Err(CustodyError::NotCustodian { bundle, caller });
        }
        record.custodian = None;
        record.owner = to;
        tracing::debug!(bundle, %to, "collateral released");
        Ok(())
    }

    fn custodian_of(&self, bundle: BundleId) -> Option<Address> {
        self.state.read().bundles.get(&bundle).and_then(|r| r.custodian)
    }

    fn owner_of(&self, bundle: BundleId) -> Option<Address> {
        self.state
            .read()
            .bundles
            .get(&bundle)
            .filter(|r| r.custodian.is_none())
            .map(|r| r.owner)
    }

    fn permit(
        &self,
        permit: &CollateralPermit,
        signature: &RecoverableSignature,
    ) -> Result<(), CustodyError> {
        let now = self.clock.unix_seconds();
        if now > permit.deadline {
            return Err(CustodyError::PermitRejected(format!(
                "expired at {}, now {}",
                permit.deadline, now
            )));
        }
        let signer = recover_typed(&self.domain, permit, signature)
            .map_err(|e| CustodyError::PermitRejected(e.to_string()))?;
        if signer != permit.owner {
            return Err(CustodyError::PermitRejected(format!(
                "signed by {}, not owner {}",
                signer, permit.owner
            )));
        }

        let mut state = self.state.write();
        let expected_nonce = state.nonces.get(&permit.owner).copied().unwrap_or(0);
        if permit.nonce != expected_nonce {
            return Err(CustodyError::PermitRejected(format!(
                "nonce {} does not match expected {}",
                permit.nonce, expected_nonce
            )));
        }
        let record = state
            .bundles
            .get_mut(&permit.bundle)
            .ok_or(CustodyError::UnknownBundle(permit.bundle))?;
        if record.custodian.is_some() {
            return Err(CustodyError::AlreadyEscrowed(permit.bundle));
        }
        if record.owner != permit.owner {
            return Err(CustodyError::NotOwner {
                bundle: permit.bundle,
                owner: record.owner,
                claimed: permit.owner,
            });
        }
        record.approved = Some(permit.operator);
        state.nonces.insert(permit.owner, expected_nonce + 1);
        Ok(())
    }
}
