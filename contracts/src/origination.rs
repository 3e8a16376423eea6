//! # Origination
//!
//! Turns a signed set of terms into an active loan:
//!
//! 1. authorize the counterparty pair,
//! 2. lock the collateral bundle into LoanCore custody,
//! 3. pull the principal from the lender,
//! 4. quote the origination fee,
//! 5. forward `principal - fee` to the borrower and `fee` to the fee sink,
//! 6. open the loan on LoanCore.
//!
//! The whole sequence runs in one atomic frame. Any failure leaves no loan,
//! no notes, and no moved funds behind.

use pledge_protocol::address::Address;
use pledge_protocol::config::{ProtocolConfig, ORIGINATION_FEE};
use pledge_protocol::crypto::signatures::RecoverableSignature;
use pledge_protocol::crypto::typed_data::TypedDataDomain;
use std::collections::HashSet;
use std::sync::Arc;

use crate::assets::collateral::{CollateralCustody, CollateralPermit};
use crate::assets::currency::FungibleLedger;
use crate::atomic::{self, Checkpointed, Transactional};
use crate::authorizer::Authorizer;
use crate::error::{LendingError, LendingResult};
use crate::fee_engine::FeeController;
use crate::loan_core::{LoanId, LoanLedger};
use crate::terms::LoanTerms;

pub struct OriginationEngine {
    address: Address,
    authorizer: Authorizer,
    loan_core: Arc<dyn LoanLedger>,
    fees: Arc<dyn FeeController>,
    currency: Arc<dyn FungibleLedger>,
    collateral: Arc<dyn CollateralCustody>,
    fee_sink: Address,
    /// Digests of terms already used to open a loan.
    consumed: Checkpointed<HashSet<[u8; 32]>>,
}

impl OriginationEngine {
    pub fn new(
        address: Address,
        config: &ProtocolConfig,
        loan_core: Arc<dyn LoanLedger>,
        fees: Arc<dyn FeeController>,
        currency: Arc<dyn FungibleLedger>,
        collateral: Arc<dyn CollateralCustody>,
    ) -> Self {
        let domain = TypedDataDomain::new(
            config.domain_name.clone(),
            config.domain_version.clone(),
            config.network_id,
            address,
        );
        Self {
            address,
            authorizer: Authorizer::new(domain),
            loan_core,
            fees,
            currency,
            collateral,
            fee_sink: config.fee_sink,
            consumed: Checkpointed::new(HashSet::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn fee_sink(&self) -> Address {
        self.fee_sink
    }

    /// Open a loan whose collateral the borrower has already approved this
    /// engine to move.
    pub fn initialize_loan(
        &self,
        caller: Address,
        terms: &LoanTerms,
        borrower: Address,
        lender: Address,
        signature: &RecoverableSignature,
    ) -> LendingResult<LoanId> {
        atomic::run(
            &[self, &self.currency, &self.collateral, &self.loan_core],
            || self.originate(caller, terms, borrower, lender, signature, None),
        )
    }

    /// Open a loan, approving the collateral transfer in the same call with
    /// a permit the borrower signed for this engine.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_loan_with_collateral_permit(
        &self,
        caller: Address,
        terms: &LoanTerms,
        borrower: Address,
        lender: Address,
        signature: &RecoverableSignature,
        permit: &CollateralPermit,
        permit_signature: &RecoverableSignature,
    ) -> LendingResult<LoanId> {
        atomic::run(
            &[self, &self.currency, &self.collateral, &self.loan_core],
            || {
                self.originate(
                    caller,
                    terms,
                    borrower,
                    lender,
                    signature,
                    Some((permit, permit_signature)),
                )
            },
        )
    }

    fn originate(
        &self,
        caller: Address,
        terms: &LoanTerms,
        borrower: Address,
        lender: Address,
        signature: &RecoverableSignature,
        permit: Option<(&CollateralPermit, &RecoverableSignature)>,
    ) -> LendingResult<LoanId> {
        self.authorizer
            .authorize(terms, borrower, lender, signature, caller)?;

        let digest = self.authorizer.digest(terms);
        if !self.consumed.write().insert(digest) {
            tracing::warn!(%caller, digest = %hex::encode(digest), "signed terms replayed");
            return Err(LendingError::InvalidSignature);
        }

        if let Some((permit, permit_signature)) = permit {
            self.apply_permit(terms, borrower, permit, permit_signature)?;
        }

        let loan_core = self.loan_core.address();
        self.collateral
            .lock(self.address, terms.collateral_id, borrower, loan_core)
            .map_err(|e| LendingError::CollateralNotApproved(e.to_string()))?;

        let currency = terms.payable_currency;
        self.currency
            .transfer_from(self.address, currency, lender, self.address, terms.principal)
            .map_err(|e| LendingError::PaymentNotApproved(e.to_string()))?;
        tracing::debug!(%lender, principal = terms.principal, "principal pulled");

        let fee = self
            .fees
            .compute_fee_in(ORIGINATION_FEE, terms.principal, borrower, currency)?;
        let disbursed = terms
            .principal
            .checked_sub(fee)
            .ok_or(LendingError::AmountOverflow)?;

        self.currency
            .transfer(currency, self.address, borrower, disbursed)?;
        if fee > 0 {
            self.currency
                .transfer(currency, self.address, self.fee_sink, fee)?;
        }

        let loan_id = self
            .loan_core
            .create_loan(self.address, terms.clone(), borrower, lender)?;

        tracing::info!(loan_id, %borrower, %lender, disbursed, fee, "loan originated");
        Ok(loan_id)
    }

    fn apply_permit(
        &self,
        terms: &LoanTerms,
        borrower: Address,
        permit: &CollateralPermit,
        signature: &RecoverableSignature,
    ) -> LendingResult<()> {
        if permit.owner != borrower {
            return Err(LendingError::InvalidPermit(format!(
                "permit owner {} is not the borrower {}",
                permit.owner, borrower
            )));
        }
        if permit.operator != self.address {
            return Err(LendingError::InvalidPermit(format!(
                "permit operator {} is not this engine",
                permit.operator
            )));
        }
        if permit.bundle != terms.collateral_id {
            return Err(LendingError::InvalidPermit(format!(
                "permit covers bundle {}, terms reference {}",
                permit.bundle, terms.collateral_id
            )));
        }
        self.collateral.permit(permit, signature).map_err(|e| {
            tracing::warn!(%borrower, error = %e, "collateral permit rejected");
            LendingError::InvalidPermit(e.to_string())
        })
    }
}

impl Transactional for OriginationEngine {
    fn begin(&self) {
        self.consumed.begin();
    }

    fn commit(&self) {
        self.consumed.commit();
    }

    fn rollback(&self) {
        self.consumed.rollback();
    }
}
