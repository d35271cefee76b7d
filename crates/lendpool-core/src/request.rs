//! Typed request boundary
//!
//! Every mutating operation has exactly one request variant. A request names
//! the address it acts for; the caller must be that address, except for
//! liquidation which anyone may trigger.

use crate::error::{LendingError, Result};
use crate::liquidity::Withdrawal;
use crate::types::{Address, Amount, AssetId, LoanId, Wad};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LendingRequest {
    DepositCollateral {
        account: Address,
        asset: AssetId,
        amount: Amount,
    },
    WithdrawCollateral {
        account: Address,
        asset: AssetId,
        amount: Amount,
    },
    CreateLoan {
        borrower: Address,
        principal: Amount,
        duration_days: u32,
        collateral_amount: Amount,
    },
    RepayLoan {
        borrower: Address,
        loan_id: LoanId,
        amount: Amount,
    },
    Liquidate {
        loan_id: LoanId,
    },
    ProvideLiquidity {
        provider: Address,
        amount: Amount,
    },
    WithdrawLiquidity {
        provider: Address,
        amount: Amount,
    },
    ClaimRewards {
        provider: Address,
    },
}

impl LendingRequest {
    /// address the request acts for, `None` if open to anyone
    pub fn principal(&self) -> Option<Address> {
        match self {
            LendingRequest::DepositCollateral { account, .. }
            | LendingRequest::WithdrawCollateral { account, .. } => Some(*account),
            LendingRequest::CreateLoan { borrower, .. }
            | LendingRequest::RepayLoan { borrower, .. } => Some(*borrower),
            LendingRequest::ProvideLiquidity { provider, .. }
            | LendingRequest::WithdrawLiquidity { provider, .. }
            | LendingRequest::ClaimRewards { provider } => Some(*provider),
            LendingRequest::Liquidate { .. } => None,
        }
    }

    pub fn authorize(&self, caller: &Address) -> Result<()> {
        match self.principal() {
            Some(principal) if principal != *caller => Err(LendingError::Unauthorized),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LendingRequest::DepositCollateral { .. } => "deposit_collateral",
            LendingRequest::WithdrawCollateral { .. } => "withdraw_collateral",
            LendingRequest::CreateLoan { .. } => "create_loan",
            LendingRequest::RepayLoan { .. } => "repay_loan",
            LendingRequest::Liquidate { .. } => "liquidate",
            LendingRequest::ProvideLiquidity { .. } => "provide_liquidity",
            LendingRequest::WithdrawLiquidity { .. } => "withdraw_liquidity",
            LendingRequest::ClaimRewards { .. } => "claim_rewards",
        }
    }
}

/// Result of a liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidationOutcome {
    pub loan_id: LoanId,
    pub borrower: Address,
    /// total owed at liquidation time
    pub debt: Amount,
    pub collateral_seized: Amount,
    /// unseized collateral released to the borrower
    pub collateral_returned: Amount,
    /// seized collateral valued at the liquidation price
    pub proceeds: Amount,
    /// principal recovered for the pool
    pub principal_recovered: Amount,
    /// proceeds above principal, credited as pool income
    pub income: Amount,
    pub bad_debt: Amount,
    pub health_factor: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LendingResponse {
    CollateralDeposited { free_collateral: Amount },
    CollateralWithdrawn { free_collateral: Amount },
    LoanCreated { loan_id: LoanId },
    LoanRepaid { remaining_owed: Amount },
    Liquidated(LiquidationOutcome),
    LiquidityProvided { share: Wad },
    LiquidityWithdrawn(Withdrawal),
    RewardsClaimed { amount: Amount },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_json() {
        let req: LendingRequest = serde_json::from_str(
            r#"{
                "op": "create_loan",
                "borrower": "0x0101010101010101010101010101010101010101",
                "principal": "1000000000000000000000",
                "duration_days": 30,
                "collateral_amount": 2
            }"#,
        )
        .unwrap();
        assert_eq!(
            req,
            LendingRequest::CreateLoan {
                borrower: Address::repeat_byte(1),
                principal: Amount(1_000_000_000_000_000_000_000),
                duration_days: 30,
                collateral_amount: Amount(2),
            }
        );
        assert_eq!(req.name(), "create_loan");
    }

    #[test]
    fn test_authorize() {
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);
        let repay = LendingRequest::RepayLoan {
            borrower: alice,
            loan_id: LoanId(1),
            amount: Amount(1),
        };
        assert!(repay.authorize(&alice).is_ok());
        assert_eq!(repay.authorize(&bob), Err(LendingError::Unauthorized));

        let liquidate = LendingRequest::Liquidate { loan_id: LoanId(1) };
        assert!(liquidate.authorize(&bob).is_ok());
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(serde_json::from_str::<LendingRequest>(r#"{"op": "mint"}"#).is_err());
    }

    #[test]
    fn test_response_json() {
        let json = serde_json::to_value(LendingResponse::LoanCreated {
            loan_id: LoanId(3),
        })
        .unwrap();
        assert_eq!(json["result"], "loan_created");
        assert_eq!(json["loan_id"], 3);
    }
}
