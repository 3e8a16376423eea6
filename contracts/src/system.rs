//! Wiring for a complete deployment.
//!
//! [`LendingSystem::deploy`] creates every component, derives their
//! addresses, and grants the minimum capabilities each needs from the
//! others. Callers bring their own currency ledger, collateral vault and
//! clock.

use pledge_protocol::address::Address;
use pledge_protocol::config::{network_name, ProtocolConfig};
use std::sync::Arc;

use crate::access::Role;
use crate::assets::collateral::CollateralCustody;
use crate::assets::currency::FungibleLedger;
use crate::clock::Clock;
use crate::error::{LendingError, LendingResult};
use crate::fee_engine::FeeEngine;
use crate::loan_core::{LoanCore, LoanLedger};
use crate::note_token::{NoteKind, NoteToken};
use crate::origination::OriginationEngine;
use crate::repayment::RepaymentEngine;

pub struct LendingSystem {
    pub config: ProtocolConfig,
    pub admin: Address,
    pub borrower_note: Arc<NoteToken>,
    pub lender_note: Arc<NoteToken>,
    pub fee_engine: Arc<FeeEngine>,
    pub loan_core: Arc<LoanCore>,
    pub origination: OriginationEngine,
    pub repayment: RepaymentEngine,
}

impl LendingSystem {
    pub fn deploy(
        config: ProtocolConfig,
        admin: Address,
        currency: Arc<dyn FungibleLedger>,
        collateral: Arc<dyn CollateralCustody>,
        clock: Arc<dyn Clock>,
    ) -> LendingResult<Self> {
        config
            .validate()
            .map_err(|e| LendingError::IllegalInput(e.to_string()))?;

        let network = network_name(config.network_id);
        let address_of = |label: &str| Address::for_contract(&format!("{network}/{label}"));

        let borrower_note = Arc::new(NoteToken::new(
            address_of("borrower-note"),
            NoteKind::Borrower,
            admin,
        ));
        let lender_note = Arc::new(NoteToken::new(
            address_of("lender-note"),
            NoteKind::Lender,
            admin,
        ));
        let fee_engine = Arc::new(FeeEngine::with_defaults(
            address_of("fee-engine"),
            admin,
            &config,
        ));
        let loan_core = Arc::new(LoanCore::new(
            address_of("loan-core"),
            admin,
            borrower_note.clone(),
            lender_note.clone(),
            currency.clone(),
            collateral.clone(),
            clock,
        ));
        let origination = OriginationEngine::new(
            address_of("origination"),
            &config,
            loan_core.clone(),
            fee_engine.clone(),
            currency.clone(),
            collateral,
        );
        let repayment = RepaymentEngine::new(
            address_of("repayment"),
            loan_core.clone(),
            lender_note.clone(),
            currency,
        );

        for notes in [&borrower_note, &lender_note] {
            notes.roles().grant(admin, Role::Minter, loan_core.address())?;
            notes.roles().grant(admin, Role::Burner, loan_core.address())?;
            notes.roles().grant(admin, Role::Pauser, admin)?;
        }
        loan_core
            .roles()
            .grant(admin, Role::Originator, origination.address())?;
        loan_core
            .roles()
            .grant(admin, Role::Repayer, repayment.address())?;
        loan_core.roles().grant(admin, Role::Pauser, admin)?;
        fee_engine.roles().grant(admin, Role::FeeAdmin, admin)?;

        tracing::info!(
            network = %network,
            loan_core = %loan_core.address(),
            origination = %origination.address(),
            repayment = %repayment.address(),
            fee_sink = %config.fee_sink,
            "lending system deployed"
        );

        Ok(Self {
            config,
            admin,
            borrower_note,
            lender_note,
            fee_engine,
            loan_core,
            origination,
            repayment,
        })
    }
}
