//! error types for the lending engine

use crate::types::{Amount, LoanId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LendingError>;

/// Every failure is terminal for the call that raised it. The engine never
/// commits partial state, so callers can retry freely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendingError {
    #[error("invalid amount: must be greater than zero")]
    InvalidAmount,

    #[error("insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral { required: Amount, available: Amount },

    #[error("insufficient pool liquidity: requested {requested}, available {available}")]
    InsufficientPoolLiquidity { requested: Amount, available: Amount },

    #[error("insufficient available liquidity: requested {requested}, available {available}")]
    InsufficientAvailableLiquidity { requested: Amount, available: Amount },

    #[error("insufficient position: requested {requested}, provided {provided}")]
    InsufficientPosition { requested: Amount, provided: Amount },

    #[error("borrower already holds active loan {0}")]
    DuplicateActiveLoan(LoanId),

    #[error("unknown loan {0}")]
    UnknownLoan(LoanId),

    #[error("loan {0} is not active")]
    LoanNotActive(LoanId),

    #[error("over repayment: paid {paid}, owed {owed}")]
    OverRepayment { paid: Amount, owed: Amount },

    #[error("price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("unauthorized caller")]
    Unauthorized,

    // === extended kinds ===
    #[error("loan {0} is healthy and cannot be liquidated")]
    NotEligibleForLiquidation(LoanId),

    #[error("invalid duration: {days} days (allowed {min}..={max})")]
    InvalidDuration { days: u32, min: u32, max: u32 },

    #[error("no liquidity position")]
    NoLiquidityPosition,

    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for LendingError {
    fn from(e: sled::Error) -> Self {
        LendingError::Storage(format!("sled: {}", e))
    }
}

impl From<bincode::Error> for LendingError {
    fn from(e: bincode::Error) -> Self {
        LendingError::Storage(format!("bincode: {}", e))
    }
}
