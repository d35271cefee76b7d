//! Liquidity pool
//!
//! Providers deposit the base asset and own a pro-rata share of the pool:
//!
//! ```text
//! share(p)      = floor(amount_provided(p) * 1e18 / total_liquidity)
//! utilization   = total_borrowed / total_liquidity
//! available     = total_liquidity - total_borrowed - bad_debt
//! ```
//!
//! A liquidation shortfall is covered from protocol reserves first. The rest
//! is written down against every position in proportion to its size, so a
//! loss never falls on whoever withdraws last. Only the rounding residual of
//! a write-down stays in `bad_debt`, and it is folded into the next one.
//!
//! Pool income (interest, origination and withdrawal fees, liquidation
//! surplus) is split between protocol reserves and providers. The provider
//! part raises a global reward index, so each position earns
//! `amount_provided * (index - checkpoint)` regardless of how shares moved
//! in between.

use crate::error::{LendingError, Result};
use crate::math;
use crate::types::{Address, Amount, AssetId, Bps, Timestamp, Wad, WAD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Tunable pool economics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    /// provider APY with an idle pool
    pub base_apy_bps: Bps,
    /// added to the APY in proportion to utilization
    pub max_utilization_bonus_bps: Bps,
    /// charged on withdrawals and paid to the remaining providers
    pub withdrawal_fee_bps: Bps,
    /// cut of all pool income kept as protocol reserves
    pub protocol_reserve_bps: Bps,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            base_apy_bps: Bps(350),
            max_utilization_bonus_bps: Bps(200),
            withdrawal_fee_bps: Bps(10),
            protocol_reserve_bps: Bps(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub base_asset: AssetId,
    pub collateral_asset: AssetId,
    pub total_liquidity: Amount,
    pub total_borrowed: Amount,
    /// shortfall not yet written down (rounding residual)
    pub bad_debt: Amount,
    /// lifetime shortfall written down against positions
    pub written_off: Amount,
    /// cumulative provider income per unit of liquidity (1e18 scale)
    pub reward_index: Wad,
    /// income not yet reflected in the index
    pub undistributed_rewards: Amount,
    pub protocol_reserves: Amount,
    /// collateral taken from liquidated borrowers, held by the pool
    pub seized_collateral: Amount,
    pub lifetime_fees: Amount,
}

impl PoolState {
    pub fn new(base_asset: AssetId, collateral_asset: AssetId) -> Self {
        Self {
            base_asset,
            collateral_asset,
            total_liquidity: Amount::ZERO,
            total_borrowed: Amount::ZERO,
            bad_debt: Amount::ZERO,
            written_off: Amount::ZERO,
            reward_index: Wad::ZERO,
            undistributed_rewards: Amount::ZERO,
            protocol_reserves: Amount::ZERO,
            seized_collateral: Amount::ZERO,
            lifetime_fees: Amount::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub provider: Address,
    pub amount_provided: Amount,
    /// reward index at the last settlement
    pub reward_checkpoint: Wad,
    /// settled but unclaimed rewards
    pub pending_rewards: Amount,
    pub opened_at: Timestamp,
}

impl LiquidityPosition {
    fn accrued_since_checkpoint(&self, index: Wad) -> Result<Amount> {
        let delta = index.0.saturating_sub(self.reward_checkpoint.0);
        math::mul_div(self.amount_provided.0, delta, WAD).map(Amount)
    }

    fn settle(&mut self, index: Wad) -> Result<()> {
        let accrued = self.accrued_since_checkpoint(index)?;
        self.pending_rewards = self.pending_rewards.try_add(accrued)?;
        self.reward_checkpoint = index;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.amount_provided.is_zero() && self.pending_rewards.is_zero()
    }
}

/// Result of a liquidity withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// liquidity still provided
    pub remaining: Amount,
    /// paid out after the withdrawal fee
    pub received: Amount,
    pub fee: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolEngine {
    params: PoolParams,
    state: PoolState,
    positions: BTreeMap<Address, LiquidityPosition>,
}

impl LiquidityPoolEngine {
    pub fn new(base_asset: AssetId, collateral_asset: AssetId, params: PoolParams) -> Self {
        Self {
            params,
            state: PoolState::new(base_asset, collateral_asset),
            positions: BTreeMap::new(),
        }
    }

    /// Swap in new economics; balances are untouched
    pub fn apply_params(&mut self, params: PoolParams) {
        self.params = params;
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Add liquidity and return the provider's new share
    pub fn provide_liquidity(
        &mut self,
        provider: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Wad> {
        if amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let index = self.state.reward_index;
        let total = self.state.total_liquidity.try_add(amount)?;

        let position = self
            .positions
            .entry(provider)
            .or_insert_with(|| LiquidityPosition {
                provider,
                amount_provided: Amount::ZERO,
                reward_checkpoint: index,
                pending_rewards: Amount::ZERO,
                opened_at: now,
            });
        position.settle(index)?;
        position.amount_provided = position.amount_provided.try_add(amount)?;
        self.state.total_liquidity = total;

        self.share_of(&provider)
    }

    /// Withdraw liquidity; the fee is kept and paid to the remaining providers.
    ///
    /// Pool availability is checked before the caller's position so an
    /// over-sized request fails the same way for every caller.
    pub fn withdraw_liquidity(&mut self, provider: Address, amount: Amount) -> Result<Withdrawal> {
        if amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let available = self.available_liquidity();
        if amount > available {
            return Err(LendingError::InsufficientAvailableLiquidity {
                requested: amount,
                available,
            });
        }

        let index = self.state.reward_index;
        let position = self
            .positions
            .get_mut(&provider)
            .filter(|p| !p.amount_provided.is_zero())
            .ok_or(LendingError::NoLiquidityPosition)?;
        if amount > position.amount_provided {
            return Err(LendingError::InsufficientPosition {
                requested: amount,
                provided: position.amount_provided,
            });
        }

        position.settle(index)?;
        position.amount_provided = position.amount_provided.try_sub(amount)?;
        let remaining = position.amount_provided;
        if position.is_empty() {
            self.positions.remove(&provider);
        }
        self.state.total_liquidity = self.state.total_liquidity.try_sub(amount)?;

        let fee = self.params.withdrawal_fee_bps.apply(amount)?;
        let received = amount.try_sub(fee)?;
        self.accrue_fees(fee)?;

        Ok(Withdrawal {
            remaining,
            received,
            fee,
        })
    }

    /// Pay out everything the provider has earned so far
    pub fn claim_rewards(&mut self, provider: Address) -> Result<Amount> {
        let index = self.state.reward_index;
        let position = self
            .positions
            .get_mut(&provider)
            .ok_or(LendingError::NoLiquidityPosition)?;
        position.settle(index)?;
        let payout = std::mem::replace(&mut position.pending_rewards, Amount::ZERO);
        if position.is_empty() {
            self.positions.remove(&provider);
        }
        Ok(payout)
    }

    pub fn claimable_rewards(&self, provider: &Address) -> Result<Amount> {
        match self.positions.get(provider) {
            Some(position) => position
                .pending_rewards
                .try_add(position.accrued_since_checkpoint(self.state.reward_index)?),
            None => Ok(Amount::ZERO),
        }
    }

    /// Credit pool income: the reserve cut first, the rest to providers.
    ///
    /// With no liquidity, or for the rounding remainder of the index, the
    /// provider part waits in `undistributed_rewards` for the next credit.
    pub fn accrue_fees(&mut self, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let reserve = self.params.protocol_reserve_bps.apply(amount)?;
        self.state.protocol_reserves = self.state.protocol_reserves.try_add(reserve)?;
        self.state.lifetime_fees = self.state.lifetime_fees.try_add(amount)?;

        let distributable = amount
            .try_sub(reserve)?
            .try_add(self.state.undistributed_rewards)?;
        let total = self.state.total_liquidity;
        if total.is_zero() {
            self.state.undistributed_rewards = distributable;
            return Ok(());
        }

        let delta = math::mul_div(distributable.0, WAD, total.0)?;
        // booked rounded up so claims never exceed what was credited
        let booked = Amount(math::mul_div_ceil(delta, total.0, WAD)?);
        self.state.reward_index = Wad(self
            .state
            .reward_index
            .0
            .checked_add(delta)
            .ok_or(LendingError::ArithmeticOverflow)?);
        self.state.undistributed_rewards = distributable.try_sub(booked)?;

        debug!(
            "accrued {} income: reserve {}, distributed {}, carried {}",
            amount, reserve, booked, self.state.undistributed_rewards
        );
        Ok(())
    }

    // === borrow hooks ===

    pub fn record_borrow(&mut self, principal: Amount) -> Result<()> {
        let available = self.available_liquidity();
        if principal > available {
            return Err(LendingError::InsufficientPoolLiquidity {
                requested: principal,
                available,
            });
        }
        self.state.total_borrowed = self.state.total_borrowed.try_add(principal)?;
        Ok(())
    }

    pub fn record_principal_repaid(&mut self, amount: Amount) -> Result<()> {
        self.state.total_borrowed = self.state.total_borrowed.try_sub(amount)?;
        Ok(())
    }

    /// Close out a liquidated loan's principal and return the shortfall
    pub fn record_liquidation(
        &mut self,
        outstanding: Amount,
        recovered: Amount,
        seized_collateral: Amount,
    ) -> Result<Amount> {
        self.state.total_borrowed = self.state.total_borrowed.try_sub(outstanding)?;
        self.state.seized_collateral = self.state.seized_collateral.try_add(seized_collateral)?;
        let shortfall = outstanding.saturating_sub(recovered);
        self.absorb_loss(shortfall)?;
        Ok(shortfall)
    }

    /// Reserves first, then a pro-rata write-down of every position
    fn absorb_loss(&mut self, shortfall: Amount) -> Result<()> {
        let covered = shortfall.min(self.state.protocol_reserves);
        self.state.protocol_reserves = self.state.protocol_reserves.try_sub(covered)?;

        let loss = shortfall.try_sub(covered)?.try_add(self.state.bad_debt)?;
        let total = self.state.total_liquidity;
        if loss.is_zero() || total.is_zero() {
            self.state.bad_debt = loss;
            return Ok(());
        }

        // rewards earned so far were earned on the full position
        let index = self.state.reward_index;
        let mut written_off = Amount::ZERO;
        for position in self.positions.values_mut() {
            position.settle(index)?;
            let cut = Amount(math::mul_div(position.amount_provided.0, loss.0, total.0)?);
            position.amount_provided = position.amount_provided.try_sub(cut)?;
            written_off = written_off.try_add(cut)?;
        }
        self.positions.retain(|_, position| !position.is_empty());

        self.state.total_liquidity = total.try_sub(written_off)?;
        self.state.written_off = self.state.written_off.try_add(written_off)?;
        self.state.bad_debt = loss.try_sub(written_off)?;

        debug!(
            "absorbed {} shortfall: reserves {}, written down {}, residual {}",
            shortfall, covered, written_off, self.state.bad_debt
        );
        Ok(())
    }

    // === queries ===

    pub fn available_liquidity(&self) -> Amount {
        self.state
            .total_liquidity
            .saturating_sub(self.state.total_borrowed)
            .saturating_sub(self.state.bad_debt)
    }

    /// zero for an empty pool
    pub fn utilization(&self) -> Result<Wad> {
        if self.state.total_liquidity.is_zero() {
            return Ok(Wad::ZERO);
        }
        Wad::from_ratio(self.state.total_borrowed.0, self.state.total_liquidity.0)
    }

    /// base APY plus the utilization bonus
    pub fn apy_bps(&self) -> Result<Bps> {
        let utilization = self.utilization()?.min(Wad::ONE);
        let bonus = math::mul_div(
            utilization.0,
            self.params.max_utilization_bonus_bps.0 as u128,
            WAD,
        )?;
        // bonus <= max_utilization_bonus_bps, so it fits in u32
        let bonus = u32::try_from(bonus).map_err(|_| LendingError::ArithmeticOverflow)?;
        self.params
            .base_apy_bps
            .0
            .checked_add(bonus)
            .map(Bps)
            .ok_or(LendingError::ArithmeticOverflow)
    }

    pub fn share_of(&self, provider: &Address) -> Result<Wad> {
        let total = self.state.total_liquidity;
        match self.positions.get(provider) {
            Some(position) if !total.is_zero() => {
                math::mul_div(position.amount_provided.0, WAD, total.0).map(Wad)
            }
            _ => Ok(Wad::ZERO),
        }
    }

    pub fn shares(&self) -> Result<Vec<(Address, Wad)>> {
        self.positions
            .keys()
            .map(|provider| Ok((*provider, self.share_of(provider)?)))
            .collect()
    }

    /// 100% minus the sum of all floored shares
    pub fn unattributed_share(&self) -> Result<Wad> {
        if self.state.total_liquidity.is_zero() {
            return Ok(Wad::ZERO);
        }
        let attributed = self
            .shares()?
            .iter()
            .try_fold(0u128, |acc, (_, share)| acc.checked_add(share.0))
            .ok_or(LendingError::ArithmeticOverflow)?;
        Ok(Wad(WAD.saturating_sub(attributed)))
    }

    pub fn position(&self, provider: &Address) -> Option<&LiquidityPosition> {
        self.positions.get(provider)
    }

    pub fn positions(&self) -> impl Iterator<Item = &LiquidityPosition> {
        self.positions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> LiquidityPoolEngine {
        LiquidityPoolEngine::new(
            AssetId::new("DAI"),
            AssetId::new("ETH"),
            PoolParams::default(),
        )
    }

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_share_scenario_with_seed() {
        let mut pool = pool();
        let (seed, a, b) = (addr(0), addr(1), addr(2));

        pool.provide_liquidity(seed, Amount(10_000), 0).unwrap();
        let share_a = pool.provide_liquidity(a, Amount(4_000), 1).unwrap();
        assert_eq!(share_a.percent(), "28.57%");

        let share_b = pool.provide_liquidity(b, Amount(6_000), 2).unwrap();
        assert_eq!(share_b.percent(), "30.00%");
        assert_eq!(pool.share_of(&a).unwrap().percent(), "20.00%");
        assert_eq!(pool.state().total_liquidity, Amount(20_000));
    }

    #[test]
    fn test_share_scenario_small_seed() {
        let mut pool = pool();
        pool.provide_liquidity(addr(0), Amount(4_000), 0).unwrap();
        pool.provide_liquidity(addr(1), Amount(4_000), 0).unwrap();
        pool.provide_liquidity(addr(2), Amount(6_000), 0).unwrap();

        assert_eq!(pool.state().total_liquidity, Amount(14_000));
        assert_eq!(pool.share_of(&addr(1)).unwrap().percent(), "28.57%");
        assert_eq!(pool.share_of(&addr(2)).unwrap().percent(), "42.85%");
    }

    #[test]
    fn test_shares_never_exceed_whole() {
        let mut pool = pool();
        for i in 1..=3u8 {
            pool.provide_liquidity(addr(i), Amount(1), 0).unwrap();
        }
        let dust = pool.unattributed_share().unwrap();
        assert!(dust > Wad::ZERO);
        let sum: u128 = pool.shares().unwrap().iter().map(|(_, s)| s.0).sum();
        assert_eq!(sum + dust.0, WAD);
    }

    #[test]
    fn test_withdraw_checks_pool_before_position() {
        let mut pool = pool();
        let (a, stranger) = (addr(1), addr(9));
        pool.provide_liquidity(a, Amount(1000), 0).unwrap();
        pool.record_borrow(Amount(600)).unwrap();

        let expected = Err(LendingError::InsufficientAvailableLiquidity {
            requested: Amount(500),
            available: Amount(400),
        });
        assert_eq!(pool.withdraw_liquidity(a, Amount(500)), expected);
        assert_eq!(pool.withdraw_liquidity(stranger, Amount(500)), expected);
        assert_eq!(
            pool.withdraw_liquidity(stranger, Amount(100)),
            Err(LendingError::NoLiquidityPosition)
        );
        assert_eq!(
            pool.withdraw_liquidity(a, Amount::ZERO),
            Err(LendingError::InvalidAmount)
        );
    }

    #[test]
    fn test_withdraw_more_than_position() {
        let mut pool = pool();
        pool.provide_liquidity(addr(1), Amount(1000), 0).unwrap();
        pool.provide_liquidity(addr(2), Amount(5000), 0).unwrap();
        assert_eq!(
            pool.withdraw_liquidity(addr(1), Amount(2000)),
            Err(LendingError::InsufficientPosition {
                requested: Amount(2000),
                provided: Amount(1000),
            })
        );
    }

    #[test]
    fn test_withdrawal_fee_goes_to_remaining_providers() {
        let mut pool = pool();
        let (a, b) = (addr(1), addr(2));
        pool.provide_liquidity(a, Amount(1000), 0).unwrap();
        pool.provide_liquidity(b, Amount(1000), 0).unwrap();

        let w = pool.withdraw_liquidity(a, Amount(1000)).unwrap();
        assert_eq!(
            w,
            Withdrawal {
                remaining: Amount::ZERO,
                received: Amount(999),
                fee: Amount(1),
            }
        );
        assert!(pool.position(&a).is_none());
        assert_eq!(pool.claimable_rewards(&b).unwrap(), Amount(1));
        assert_eq!(pool.share_of(&b).unwrap(), Wad::ONE);
    }

    #[test]
    fn test_rewards_proportional_to_share() {
        let mut pool = pool();
        let (a, b) = (addr(1), addr(2));
        pool.provide_liquidity(a, Amount(1000), 0).unwrap();
        pool.provide_liquidity(b, Amount(3000), 0).unwrap();

        pool.accrue_fees(Amount(1000)).unwrap();
        assert_eq!(pool.state().protocol_reserves, Amount(100));
        assert_eq!(pool.claimable_rewards(&a).unwrap(), Amount(225));
        assert_eq!(pool.claimable_rewards(&b).unwrap(), Amount(675));
        assert_eq!(pool.state().undistributed_rewards, Amount::ZERO);

        assert_eq!(pool.claim_rewards(a).unwrap(), Amount(225));
        assert_eq!(pool.claimable_rewards(&a).unwrap(), Amount::ZERO);
        assert_eq!(pool.claim_rewards(a).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_rewards_follow_share_changes() {
        let mut pool = pool();
        let (a, b) = (addr(1), addr(2));
        pool.provide_liquidity(a, Amount(1000), 0).unwrap();
        pool.accrue_fees(Amount(100)).unwrap();
        // b joins after the first credit and earns nothing from it
        pool.provide_liquidity(b, Amount(1000), 0).unwrap();
        pool.accrue_fees(Amount(100)).unwrap();

        assert_eq!(pool.claimable_rewards(&a).unwrap(), Amount(135));
        assert_eq!(pool.claimable_rewards(&b).unwrap(), Amount(45));
    }

    #[test]
    fn test_income_into_empty_pool_is_parked() {
        let mut pool = pool();
        pool.accrue_fees(Amount(100)).unwrap();
        assert_eq!(pool.state().undistributed_rewards, Amount(90));
        assert_eq!(pool.state().protocol_reserves, Amount(10));

        pool.provide_liquidity(addr(1), Amount(1000), 0).unwrap();
        pool.accrue_fees(Amount(100)).unwrap();
        assert_eq!(pool.claimable_rewards(&addr(1)).unwrap(), Amount(180));
    }

    #[test]
    fn test_rounding_remainder_carried() {
        let mut pool = pool();
        for i in 1..=3u8 {
            pool.provide_liquidity(addr(i), Amount(1), 0).unwrap();
        }
        pool.accrue_fees(Amount(11)).unwrap();
        let paid: u128 = (1..=3u8)
            .map(|i| pool.claimable_rewards(&addr(i)).unwrap().0)
            .sum();
        assert!(paid + pool.state().undistributed_rewards.0 <= 10);
    }

    #[test]
    fn test_new_params_keep_balances() {
        let mut pool = pool();
        pool.provide_liquidity(addr(1), Amount(1000), 0).unwrap();
        let params = PoolParams {
            withdrawal_fee_bps: Bps::ZERO,
            ..PoolParams::default()
        };
        pool.apply_params(params);
        assert_eq!(pool.params(), &params);
        assert_eq!(pool.state().total_liquidity, Amount(1000));

        let w = pool.withdraw_liquidity(addr(1), Amount(1000)).unwrap();
        assert_eq!(w.fee, Amount::ZERO);
        assert_eq!(w.received, Amount(1000));
    }

    #[test]
    fn test_utilization_and_apy() {
        let mut pool = pool();
        assert_eq!(pool.utilization().unwrap(), Wad::ZERO);
        assert_eq!(pool.apy_bps().unwrap(), Bps(350));

        pool.provide_liquidity(addr(1), Amount(1000), 0).unwrap();
        pool.record_borrow(Amount(600)).unwrap();
        assert_eq!(pool.utilization().unwrap().percent(), "60.00%");
        assert_eq!(pool.apy_bps().unwrap(), Bps(470));
        assert_eq!(
            pool.record_borrow(Amount(401)),
            Err(LendingError::InsufficientPoolLiquidity {
                requested: Amount(401),
                available: Amount(400),
            })
        );
    }

    #[test]
    fn test_liquidation_shortfall_is_written_down() {
        let mut pool = pool();
        pool.provide_liquidity(addr(1), Amount(1000), 0).unwrap();
        pool.record_borrow(Amount(600)).unwrap();

        let shortfall = pool
            .record_liquidation(Amount(600), Amount(450), Amount(3))
            .unwrap();
        assert_eq!(shortfall, Amount(150));
        assert_eq!(pool.state().total_borrowed, Amount::ZERO);
        assert_eq!(pool.state().bad_debt, Amount::ZERO);
        assert_eq!(pool.state().written_off, Amount(150));
        assert_eq!(pool.state().total_liquidity, Amount(850));
        assert_eq!(pool.position(&addr(1)).unwrap().amount_provided, Amount(850));
        assert_eq!(pool.available_liquidity(), Amount(850));
        assert_eq!(pool.state().seized_collateral, Amount(3));
    }

    #[test]
    fn test_shortfall_uses_reserves_then_positions() {
        let mut pool = pool();
        let (a, b) = (addr(1), addr(2));
        pool.provide_liquidity(a, Amount(1000), 0).unwrap();
        pool.provide_liquidity(b, Amount(3000), 0).unwrap();
        // 100 to reserves, 225 / 675 to a / b
        pool.accrue_fees(Amount(1000)).unwrap();
        pool.record_borrow(Amount(2000)).unwrap();

        // 150 short: 100 from reserves, 50 split 1:3
        pool.record_liquidation(Amount(2000), Amount(1850), Amount(10))
            .unwrap();
        assert_eq!(pool.state().protocol_reserves, Amount::ZERO);
        assert_eq!(pool.position(&a).unwrap().amount_provided, Amount(988));
        assert_eq!(pool.position(&b).unwrap().amount_provided, Amount(2963));
        assert_eq!(pool.state().written_off, Amount(49));
        assert_eq!(pool.state().bad_debt, Amount(1));
        assert_eq!(pool.state().total_liquidity, Amount(3951));
        assert_eq!(pool.available_liquidity(), Amount(3950));

        // rewards earned before the loss are kept
        assert_eq!(pool.claimable_rewards(&a).unwrap(), Amount(225));
        assert_eq!(pool.claimable_rewards(&b).unwrap(), Amount(675));

        // every provider can leave with their written-down position
        pool.withdraw_liquidity(b, Amount(2963)).unwrap();
        assert_eq!(pool.position(&a).unwrap().amount_provided, Amount(988));
        assert!(pool.available_liquidity() >= Amount(987));
    }

    #[test]
    fn test_residual_folds_into_next_write_down() {
        let mut pool = pool();
        for i in 1..=3u8 {
            pool.provide_liquidity(addr(i), Amount(1000), 0).unwrap();
        }
        pool.record_borrow(Amount(100)).unwrap();
        // 100 / 3 = 33 each, 1 left over
        pool.record_liquidation(Amount(100), Amount::ZERO, Amount(1))
            .unwrap();
        assert_eq!(pool.state().bad_debt, Amount(1));
        assert_eq!(pool.state().total_liquidity, Amount(2901));

        pool.record_borrow(Amount(2)).unwrap();
        pool.record_liquidation(Amount(2), Amount::ZERO, Amount(1))
            .unwrap();
        // 3 to absorb: 1 each
        assert_eq!(pool.state().bad_debt, Amount::ZERO);
        assert_eq!(pool.state().total_liquidity, Amount(2898));
        assert_eq!(pool.state().written_off, Amount(102));
    }
}
