//! Events published after each committed operation

use crate::types::{Address, Amount, AssetId, LoanId, Timestamp, Wad};
use serde::Serialize;

/// Events emitted by lending operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LendingEvent {
    CollateralDeposited {
        account: Address,
        asset: AssetId,
        amount: Amount,
    },
    CollateralWithdrawn {
        account: Address,
        asset: AssetId,
        amount: Amount,
    },
    LoanOpened {
        loan_id: LoanId,
        borrower: Address,
        principal: Amount,
        collateral: Amount,
        origination_fee: Amount,
        due: Timestamp,
    },
    LoanRepaid {
        loan_id: LoanId,
        borrower: Address,
        interest: Amount,
        fee: Amount,
        principal: Amount,
        remaining_owed: Amount,
        closed: bool,
    },
    LoanLiquidated {
        loan_id: LoanId,
        borrower: Address,
        liquidator: Address,
        collateral_seized: Amount,
        debt_recovered: Amount,
        bad_debt: Amount,
    },
    LiquidityProvided {
        provider: Address,
        amount: Amount,
        share: Wad,
    },
    LiquidityWithdrawn {
        provider: Address,
        amount: Amount,
        fee: Amount,
        remaining: Amount,
    },
    RewardsClaimed {
        provider: Address,
        amount: Amount,
    },
}
