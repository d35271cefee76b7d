//! lendpool-core: collateralized lending pool engine
//!
//! Borrowers lock collateral and take fixed-rate, fixed-term loans from a
//! single pool of a base asset. Liquidity providers fund the pool and share
//! its income. Loans whose health factor falls to 1.0 or below can be
//! liquidated by anyone.
//!
//! ## architecture
//!
//! ```text
//! LendingPoolEngine (serialized, atomic operations)
//! ├── AccountLedger          collateral, loans, repayments
//! ├── InterestAccrualEngine  simple interest, origination fee
//! ├── CollateralRiskEngine   LTV, health factor, price validation
//! ├── LiquidityPoolEngine    LP shares, utilization, rewards
//! ├── PriceOracle            quotes (fail closed)
//! ├── StateStore             memory or sled
//! └── Clock                  system or manual
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod interest;
pub mod ledger;
pub mod liquidity;
pub mod math;
pub mod oracle;
pub mod request;
pub mod risk;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OracleConfig, PoolConfig, SeedPosition};
pub use engine::{AccountSnapshot, LendingPoolEngine, LoanView, PoolSnapshot};
pub use error::{LendingError, Result};
pub use events::LendingEvent;
pub use interest::{InterestAccrualEngine, InterestDue, SECONDS_PER_DAY, SECONDS_PER_YEAR};
pub use ledger::{Account, AccountLedger, Loan, LoanStatus, RepaymentBreakdown};
pub use liquidity::{LiquidityPoolEngine, LiquidityPosition, PoolParams, PoolState, Withdrawal};
pub use oracle::{PriceOracle, RetryingOracle, StaticOracle};
pub use request::{LendingRequest, LendingResponse, LiquidationOutcome};
pub use risk::{CollateralRiskEngine, RiskAssessment};
pub use store::{EngineState, MemoryStore, SledStore, StateStore};
pub use types::{Address, Amount, AssetId, Bps, LoanId, Price, PriceQuote, Timestamp, Wad, WAD};
