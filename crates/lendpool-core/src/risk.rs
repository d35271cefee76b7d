//! Collateral risk checks
//!
//! LTV and health factor are [`Wad`] ratios. Health factor:
//!
//! ```text
//! hf = collateral_value * liquidation_threshold / total_owed
//!
//!   hf >  1.0   safe
//!   hf <= 1.0   eligible for liquidation
//! ```
//!
//! With the default 85% threshold a loan becomes liquidatable once its LTV
//! reaches 85%.

use crate::error::{LendingError, Result};
use crate::math;
use crate::types::{Amount, AssetId, Bps, Price, PriceQuote, Timestamp, Wad, BPS_DENOMINATOR};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralRiskEngine {
    /// max loan-to-value at origination
    pub max_ltv: Bps,
    pub liquidation_threshold: Bps,
    /// bonus collateral seized on top of the debt
    pub liquidation_penalty: Bps,
    /// quotes older than this are rejected
    pub max_price_age_secs: u64,
}

/// Snapshot of a loan's risk at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub collateral_value: Amount,
    pub total_owed: Amount,
    pub ltv: Wad,
    pub health_factor: Wad,
    pub liquidatable: bool,
}

impl CollateralRiskEngine {
    /// Accept a quote only if it is present, non-zero and fresh
    pub fn validated_price(
        &self,
        asset: &AssetId,
        quote: Option<PriceQuote>,
        now: Timestamp,
    ) -> Result<Price> {
        let quote = quote
            .ok_or_else(|| LendingError::PriceUnavailable(format!("no quote for {}", asset)))?;
        if quote.price.is_zero() {
            return Err(LendingError::PriceUnavailable(format!(
                "zero price for {}",
                asset
            )));
        }
        let age = now.saturating_sub(quote.timestamp);
        if age > self.max_price_age_secs {
            return Err(LendingError::PriceUnavailable(format!(
                "stale quote for {}: {}s old (max {}s)",
                asset, age, self.max_price_age_secs
            )));
        }
        Ok(quote.price)
    }

    /// borrowed / collateral_value, `Wad::MAX` with no collateral value
    pub fn loan_to_value(&self, borrowed: Amount, collateral_value: Amount) -> Result<Wad> {
        Wad::from_ratio(borrowed.0, collateral_value.0)
    }

    /// `Wad::MAX` when nothing is owed
    pub fn health_factor(&self, total_owed: Amount, collateral_value: Amount) -> Result<Wad> {
        if total_owed.is_zero() {
            return Ok(Wad::MAX);
        }
        math::mul_div(
            collateral_value.0,
            self.liquidation_threshold.to_wad().0,
            total_owed.0,
        )
        .map(Wad)
    }

    /// largest principal the collateral supports at origination
    pub fn max_borrow(&self, collateral_amount: Amount, price: &Price) -> Result<Amount> {
        let value = price.value_of(collateral_amount)?;
        self.max_ltv.apply(value)
    }

    pub fn can_open_loan(
        &self,
        principal: Amount,
        collateral_amount: Amount,
        price: &Price,
    ) -> Result<bool> {
        Ok(principal <= self.max_borrow(collateral_amount, price)?)
    }

    /// Fails with the minimum collateral needed when the LTV cap is exceeded
    pub fn ensure_can_open_loan(
        &self,
        principal: Amount,
        collateral_amount: Amount,
        price: &Price,
    ) -> Result<()> {
        if self.can_open_loan(principal, collateral_amount, price)? {
            return Ok(());
        }
        let needed_value = math::mul_div_ceil(principal.0, BPS_DENOMINATOR, self.max_ltv.0 as u128)?;
        let required = price.amount_for_value(Amount(needed_value))?;
        debug!(
            "loan of {} rejected: collateral {} < required {}",
            principal, collateral_amount, required
        );
        Err(LendingError::InsufficientCollateral {
            required,
            available: collateral_amount,
        })
    }

    pub fn assess(
        &self,
        total_owed: Amount,
        collateral_amount: Amount,
        price: &Price,
    ) -> Result<RiskAssessment> {
        let collateral_value = price.value_of(collateral_amount)?;
        let health_factor = self.health_factor(total_owed, collateral_value)?;
        Ok(RiskAssessment {
            collateral_value,
            total_owed,
            ltv: self.loan_to_value(total_owed, collateral_value)?,
            health_factor,
            liquidatable: !total_owed.is_zero() && health_factor <= Wad::ONE,
        })
    }

    /// Collateral worth `total_owed * (1 + penalty)`, rounded up and capped
    /// at what the loan holds
    pub fn liquidation_seizure(
        &self,
        total_owed: Amount,
        collateral_amount: Amount,
        price: &Price,
    ) -> Result<Amount> {
        let with_penalty = math::mul_div_ceil(
            total_owed.0,
            BPS_DENOMINATOR + self.liquidation_penalty.0 as u128,
            BPS_DENOMINATOR,
        )?;
        let wanted = price.amount_for_value(Amount(with_penalty))?;
        Ok(wanted.min(collateral_amount))
    }
}
