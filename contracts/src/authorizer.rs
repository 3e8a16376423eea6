//! # Bilateral Authorization
//!
//! One counterparty signs the terms off-channel, the other submits them.
//! The [`Authorizer`] checks that those two people are exactly the declared
//! borrower and lender, and that nobody is both. Pure verification: it
//! never touches state.

use pledge_protocol::address::Address;
use pledge_protocol::crypto::signatures::{recover_typed, RecoverableSignature};
use pledge_protocol::crypto::typed_data::{TypedDataDomain, TypedStruct};

use crate::error::{LendingError, LendingResult};
use crate::terms::LoanTerms;

#[derive(Debug, Clone)]
pub struct Authorizer {
    domain: TypedDataDomain,
}

impl Authorizer {
    pub fn new(domain: TypedDataDomain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &TypedDataDomain {
        &self.domain
    }

    /// The 32-byte digest a counterparty signs for `terms`.
    pub fn digest(&self, terms: &LoanTerms) -> [u8; 32] {
        self.domain.digest(terms)
    }

    /// Verify `signature` over `terms` and return the signer.
    ///
    /// Fails with `InvalidSignature` if nothing recovers, `SelfDealing` if
    /// the signer is also the submitter, and `SignerMismatch` unless
    /// `{signer, submitter}` equals `{borrower, lender}` as a set.
    pub fn authorize(
        &self,
        terms: &LoanTerms,
        borrower: Address,
        lender: Address,
        signature: &RecoverableSignature,
        submitter: Address,
    ) -> LendingResult<Address> {
        let signer = recover_typed(&self.domain, terms, signature).map_err(|e| {
            tracing::warn!(%submitter, error = %e, "terms signature did not recover");
            LendingError::InvalidSignature
        })?;

        if signer == submitter {
            tracing::warn!(%signer, "self-dealing: signer submitted own terms");
            return Err(LendingError::SelfDealing(signer));
        }

        let pair_matches = (signer == borrower && submitter == lender)
            || (signer == lender && submitter == borrower);
        if !pair_matches {
            tracing::warn!(%signer, %submitter, %borrower, %lender, "counterparty mismatch");
            return Err(LendingError::SignerMismatch { signer, submitter });
        }

        tracing::debug!(
            %signer,
            %submitter,
            terms = %hex::encode(terms.struct_hash()),
            "terms authorized"
        );
        Ok(signer)
    }
}
