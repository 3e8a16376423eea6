//! Loan terms as signed by one counterparty and submitted by the other.

use pledge_protocol::address::{Address, Amount};
use pledge_protocol::crypto::typed_data::{TypedStruct, WordEncoder};
use serde::{Deserialize, Serialize};

use crate::assets::collateral::BundleId;
use crate::error::{LendingError, LendingResult};

/// Immutable once signed. Equality is exact field equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Unix seconds. A claim is possible strictly after this instant.
    pub due_date: u64,
    pub principal: Amount,
    pub interest: Amount,
    pub collateral_id: BundleId,
    pub payable_currency: Address,
}

impl LoanTerms {
    /// `principal + interest`, the amount a repayment must bring in.
    pub fn repayment_amount(&self) -> LendingResult<Amount> {
        self.principal
            .checked_add(self.interest)
            .ok_or(LendingError::AmountOverflow)
    }
}

impl TypedStruct for LoanTerms {
    const TYPE: &'static str = "LoanTerms(uint256 dueDate,uint256 principal,uint256 interest,uint256 collateralReference,address payableCurrency)";

    fn encode_fields(&self, encoder: &mut WordEncoder) {
        encoder
            .uint(self.due_date as u128)
            .uint(self.principal)
            .uint(self.interest)
            .uint(self.collateral_id)
            .address(&self.payable_currency);
    }
}
