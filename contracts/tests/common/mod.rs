//! Shared fixture for the integration tests: a deployed system over an
//! in-memory ledger and vault, two funded counterparties, and a clock that
//! only moves when told.

#![allow(dead_code)]

use std::sync::Arc;

use pledge_contracts::assets::collateral::{BundleId, CollateralCustody, CollateralPermit, InMemoryVault};
use pledge_contracts::assets::currency::{FungibleLedger, InMemoryLedger};
use pledge_contracts::clock::{Clock, ManualClock};
use pledge_contracts::{LendingSystem, LoanId, LoanLedger, LoanTerms};
use pledge_protocol::address::{Address, Amount};
use pledge_protocol::config::ProtocolConfig;
use pledge_protocol::crypto::keys::PledgeKeypair;
use pledge_protocol::crypto::signatures::{sign_typed, RecoverableSignature};
use pledge_protocol::logging::{init_logging, LogFormat};

pub const PRINCIPAL: Amount = 100;
pub const INTEREST: Amount = 1;
pub const LOAN_SECONDS: i64 = 3600;

pub struct Harness {
    pub system: LendingSystem,
    pub ledger: Arc<InMemoryLedger>,
    pub vault: Arc<InMemoryVault>,
    pub clock: Arc<ManualClock>,
    pub borrower: PledgeKeypair,
    pub lender: PledgeKeypair,
    pub usd: Address,
}

impl Harness {
    pub fn new() -> Self {
        init_logging("warn", LogFormat::Pretty);

        let config = ProtocolConfig::default();
        let admin = Address::for_contract("admin");
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = Arc::new(InMemoryLedger::new());
        let vault = Arc::new(InMemoryVault::new(
            Address::for_contract("collateral-vault"),
            config.network_id,
            clock.clone(),
        ));
        let system = LendingSystem::deploy(config, admin, ledger.clone(), vault.clone(), clock.clone())
            .expect("default deployment");

        Self {
            system,
            ledger,
            vault,
            clock,
            borrower: PledgeKeypair::generate(),
            lender: PledgeKeypair::generate(),
            usd: Address::for_contract("currency:usd"),
        }
    }

    pub fn borrower(&self) -> Address {
        self.borrower.address()
    }

    pub fn lender(&self) -> Address {
        self.lender.address()
    }

    pub fn fee_sink(&self) -> Address {
        self.system.origination.fee_sink()
    }

    pub fn loan_core(&self) -> Address {
        self.system.loan_core.address()
    }

    pub fn balance(&self, holder: Address) -> Amount {
        self.ledger.balance_of(self.usd, holder)
    }

    /// A bundle owned by the borrower, not yet approved to anyone.
    pub fn bundle(&self) -> BundleId {
        self.vault.deposit(self.borrower())
    }

    /// A bundle the origination engine may move.
    pub fn approved_bundle(&self) -> BundleId {
        let bundle = self.bundle();
        self.vault
            .approve(self.borrower(), self.system.origination.address(), bundle)
            .expect("borrower owns fresh bundle");
        bundle
    }

    /// Give the lender the principal and approve the origination engine for it.
    pub fn fund_lender(&self) {
        self.ledger
            .mint(self.usd, self.lender(), PRINCIPAL)
            .expect("mint principal");
        self.ledger.approve(
            self.usd,
            self.lender(),
            self.system.origination.address(),
            PRINCIPAL,
        );
    }

    pub fn terms(&self, bundle: BundleId) -> LoanTerms {
        LoanTerms {
            due_date: self.clock.unix_seconds() + LOAN_SECONDS as u64,
            principal: PRINCIPAL,
            interest: INTEREST,
            collateral_id: bundle,
            payable_currency: self.usd,
        }
    }

    pub fn sign(&self, signer: &PledgeKeypair, terms: &LoanTerms) -> RecoverableSignature {
        sign_typed(signer, self.system.origination.authorizer().domain(), terms)
    }

    pub fn permit(&self, bundle: BundleId) -> CollateralPermit {
        CollateralPermit {
            owner: self.borrower(),
            operator: self.system.origination.address(),
            bundle,
            nonce: self.vault.nonce(self.borrower()),
            deadline: self.clock.unix_seconds() + 600,
        }
    }

    pub fn sign_permit(&self, signer: &PledgeKeypair, permit: &CollateralPermit) -> RecoverableSignature {
        sign_typed(signer, self.vault.domain(), permit)
    }

    /// Lender signs, borrower submits. Collateral and principal are
    /// pre-approved.
    pub fn originate(&self) -> anyhow::Result<(LoanId, LoanTerms)> {
        let terms = self.terms(self.approved_bundle());
        self.fund_lender();
        let signature = self.sign(&self.lender, &terms);
        let loan_id = self.system.origination.initialize_loan(
            self.borrower(),
            &terms,
            self.borrower(),
            self.lender(),
            &signature,
        )?;
        Ok((loan_id, terms))
    }

    /// Top the borrower up to the payoff and approve the repayment engine.
    pub fn prepare_repayment(&self, payer: Address) {
        let payoff = PRINCIPAL + INTEREST;
        let held = self.balance(payer);
        if held < payoff {
            self.ledger
                .mint(self.usd, payer, payoff - held)
                .expect("mint payoff");
        }
        self.ledger
            .approve(self.usd, payer, self.system.repayment.address(), payoff);
    }

    pub fn custodian(&self, bundle: BundleId) -> Option<Address> {
        self.vault.custodian_of(bundle)
    }

    pub fn owner(&self, bundle: BundleId) -> Option<Address> {
        self.vault.owner_of(bundle)
    }
}
