//! pool configuration
//!
//! Loaded from TOML; every field has a default so an empty file is a valid
//! pool. Rates are basis points.
//!
//! ```toml
//! base_asset = "DAI"
//! collateral_asset = "ETH"
//! interest_rate_bps = 350
//! max_ltv_bps = 8000
//!
//! [oracle]
//! timeout_ms = 5000
//!
//! [prices]
//! ETH = "2000"
//!
//! [[seed_liquidity]]
//! provider = "0x0000000000000000000000000000000000000001"
//! amount = "10000"
//! ```

use crate::error::{LendingError, Result};
use crate::interest::InterestAccrualEngine;
use crate::liquidity::PoolParams;
use crate::risk::CollateralRiskEngine;
use crate::types::{Address, Amount, AssetId, Bps, Price};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// asset lent out and provided as liquidity
    pub base_asset: AssetId,
    pub collateral_asset: AssetId,
    /// fixed APR charged to borrowers
    pub interest_rate_bps: Bps,
    pub origination_fee_bps: Bps,
    pub max_ltv_bps: Bps,
    pub liquidation_threshold_bps: Bps,
    pub liquidation_penalty_bps: Bps,
    pub withdrawal_fee_bps: Bps,
    pub protocol_reserve_bps: Bps,
    pub base_apy_bps: Bps,
    pub max_utilization_bonus_bps: Bps,
    pub min_duration_days: u32,
    pub max_duration_days: u32,
    pub max_price_age_secs: u64,
    pub oracle: OracleConfig,
    /// liquidity credited at genesis
    pub seed_liquidity: Vec<SeedPosition>,
    /// static quotes in base units per collateral unit
    pub prices: BTreeMap<AssetId, Price>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_asset: AssetId::new("DAI"),
            collateral_asset: AssetId::new("ETH"),
            interest_rate_bps: Bps(350),
            origination_fee_bps: Bps(10),
            max_ltv_bps: Bps(8000),
            liquidation_threshold_bps: Bps(8500),
            liquidation_penalty_bps: Bps(500),
            withdrawal_fee_bps: Bps(10),
            protocol_reserve_bps: Bps(1000),
            base_apy_bps: Bps(350),
            max_utilization_bonus_bps: Bps(200),
            min_duration_days: 7,
            max_duration_days: 90,
            max_price_age_secs: 3600,
            oracle: OracleConfig::default(),
            seed_liquidity: Vec::new(),
            prices: BTreeMap::new(),
        }
    }
}

/// price lookup limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// overall bound on one price lookup, retries included
    pub timeout_ms: u64,
    pub attempt_timeout_ms: u64,
    pub retry_attempts: u32,
    /// first backoff delay, doubled per retry
    pub backoff_base_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            attempt_timeout_ms: 1500,
            retry_attempts: 3,
            backoff_base_ms: 100,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPosition {
    pub provider: Address,
    pub amount: Amount,
}

impl PoolConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PoolConfig =
            toml::from_str(s).map_err(|e| LendingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LendingError::InvalidConfig(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LendingError::InvalidConfig(msg));

        if self.base_asset == self.collateral_asset {
            return invalid(format!(
                "base and collateral asset are both {}",
                self.base_asset
            ));
        }
        if self.max_ltv_bps == Bps::ZERO || self.max_ltv_bps > Bps::MAX {
            return invalid(format!("max_ltv_bps out of range: {}", self.max_ltv_bps.0));
        }
        if self.liquidation_threshold_bps <= self.max_ltv_bps
            || self.liquidation_threshold_bps > Bps::MAX
        {
            return invalid(format!(
                "liquidation_threshold_bps must be above max_ltv_bps ({}) and at most 10000, got {}",
                self.max_ltv_bps.0, self.liquidation_threshold_bps.0
            ));
        }
        for (name, bps) in [
            ("origination_fee_bps", self.origination_fee_bps),
            ("withdrawal_fee_bps", self.withdrawal_fee_bps),
            ("protocol_reserve_bps", self.protocol_reserve_bps),
            ("liquidation_penalty_bps", self.liquidation_penalty_bps),
        ] {
            if bps > Bps::MAX {
                return invalid(format!("{} above 10000: {}", name, bps.0));
            }
        }
        if self.min_duration_days == 0 || self.min_duration_days > self.max_duration_days {
            return invalid(format!(
                "invalid duration bounds {}..={}",
                self.min_duration_days, self.max_duration_days
            ));
        }
        if self.oracle.timeout_ms == 0 || self.oracle.attempt_timeout_ms == 0 {
            return invalid("oracle timeouts must be non-zero".into());
        }
        if let Some(seed) = self.seed_liquidity.iter().find(|s| s.amount.is_zero()) {
            return invalid(format!("zero seed liquidity for {}", seed.provider));
        }
        Ok(())
    }

    pub fn risk_engine(&self) -> CollateralRiskEngine {
        CollateralRiskEngine {
            max_ltv: self.max_ltv_bps,
            liquidation_threshold: self.liquidation_threshold_bps,
            liquidation_penalty: self.liquidation_penalty_bps,
            max_price_age_secs: self.max_price_age_secs,
        }
    }

    pub fn interest_engine(&self) -> InterestAccrualEngine {
        InterestAccrualEngine::new(self.origination_fee_bps)
    }

    pub fn pool_params(&self) -> PoolParams {
        PoolParams {
            base_apy_bps: self.base_apy_bps,
            max_utilization_bonus_bps: self.max_utilization_bonus_bps,
            withdrawal_fee_bps: self.withdrawal_fee_bps,
            protocol_reserve_bps: self.protocol_reserve_bps,
        }
    }
}
