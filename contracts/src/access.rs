//! # Capabilities and Pause State
//!
//! Privileged operations check an explicit capability map
//! (`role → set of principals`) as their first step. There are no implicit
//! modifiers: a function that needs a role calls [`RoleRegistry::require`]
//! and propagates the error.
//!
//! Each contract owns its own registry and pause switch. Granting LoanCore
//! the `Minter` role on a note token says nothing about LoanCore's rights
//! anywhere else.

use parking_lot::RwLock;
use pledge_protocol::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{LendingError, LendingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes every role, including itself.
    Admin,
    /// May open loans on LoanCore.
    Originator,
    /// May settle (repay or claim) loans on LoanCore.
    Repayer,
    /// May mint note tokens.
    Minter,
    /// May burn note tokens.
    Burner,
    /// May pause and unpause.
    Pauser,
    /// May change fee rules and waivers.
    FeeAdmin,
}

#[derive(Debug, Default)]
pub struct RoleRegistry {
    grants: RwLock<HashMap<Role, HashSet<Address>>>,
}

impl RoleRegistry {
    /// A registry where `admin` holds `Admin`.
    pub fn new(admin: Address) -> Self {
        let registry = Self::default();
        registry
            .grants
            .write()
            .entry(Role::Admin)
            .or_default()
            .insert(admin);
        registry
    }

    pub fn has_role(&self, role: Role, principal: Address) -> bool {
        self.grants
            .read()
            .get(&role)
            .is_some_and(|holders| holders.contains(&principal))
    }

    pub fn require(&self, role: Role, principal: Address) -> LendingResult<()> {
        if self.has_role(role, principal) {
            Ok(())
        } else {
            tracing::warn!(%principal, ?role, "capability check failed");
            Err(LendingError::Unauthorized { principal, role })
        }
    }

    pub fn grant(&self, caller: Address, role: Role, principal: Address) -> LendingResult<()> {
        self.require(Role::Admin, caller)?;
        self.grants.write().entry(role).or_default().insert(principal);
        tracing::info!(%caller, %principal, ?role, "role granted");
        Ok(())
    }

    pub fn revoke(&self, caller: Address, role: Role, principal: Address) -> LendingResult<()> {
        self.require(Role::Admin, caller)?;
        if let Some(holders) = self.grants.write().get_mut(&role) {
            holders.remove(&principal);
        }
        tracing::info!(%caller, %principal, ?role, "role revoked");
        Ok(())
    }

    /// Give up one of your own roles. Needs no admin.
    pub fn renounce(&self, caller: Address, role: Role) {
        if let Some(holders) = self.grants.write().get_mut(&role) {
            holders.remove(&caller);
        }
    }

    pub fn holders(&self, role: Role) -> Vec<Address> {
        let mut holders: Vec<Address> = self
            .grants
            .read()
            .get(&role)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }
}

/// Pause switch, gated by the owning contract's `Pauser` role.
#[derive(Debug, Default)]
pub struct PauseState {
    paused: RwLock<bool>,
}

impl PauseState {
    pub fn is_paused(&self) -> bool {
        *self.paused.read()
    }

    pub fn require_not_paused(&self) -> LendingResult<()> {
        if self.is_paused() {
            Err(LendingError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn pause(&self, roles: &RoleRegistry, caller: Address) -> LendingResult<()> {
        roles.require(Role::Pauser, caller)?;
        *self.paused.write() = true;
        tracing::warn!(%caller, "paused");
        Ok(())
    }

    pub fn unpause(&self, roles: &RoleRegistry, caller: Address) -> LendingResult<()> {
        roles.require(Role::Pauser, caller)?;
        *self.paused.write() = false;
        tracing::info!(%caller, "unpaused");
        Ok(())
    }
}
