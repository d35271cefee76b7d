//! Simple-interest accrual
//!
//! Interest accrues linearly on the outstanding principal between
//! checkpoints. A repayment moves the checkpoint forward and carries any
//! unpaid interest, so the lifetime total keeps growing monotonically while
//! later accrual runs on the reduced principal. The fraction of a base unit
//! left over at a checkpoint is carried too (1e18 scale), so frequent small
//! repayments accrue the same interest as one large one.

use crate::error::{LendingError, Result};
use crate::ledger::Loan;
use crate::math;
use crate::types::{Amount, Bps, Timestamp, Wad, BPS_DENOMINATOR, WAD};
use num_bigint::BigUint;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Unpaid interest at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterestDue {
    /// whole base units
    pub amount: Amount,
    /// fraction of one more unit, 1e18 scale
    pub fraction: Wad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestAccrualEngine {
    pub origination_fee_bps: Bps,
}

impl InterestAccrualEngine {
    pub fn new(origination_fee_bps: Bps) -> Self {
        Self {
            origination_fee_bps,
        }
    }

    /// Lifetime interest of `loan` as of `as_of`, paid or not.
    ///
    /// Frozen at the close timestamp. A timestamp before the last checkpoint
    /// accrues nothing.
    pub fn accrued_interest(&self, loan: &Loan, as_of: Timestamp) -> Result<Amount> {
        loan.interest_paid.try_add(self.accrual(loan, as_of)?.amount)
    }

    /// accrued and not yet paid
    pub fn interest_due(&self, loan: &Loan, as_of: Timestamp) -> Result<Amount> {
        Ok(self.accrual(loan, as_of)?.amount)
    }

    /// Unpaid interest as of `as_of`, with the fraction a checkpoint carries
    pub fn accrual(&self, loan: &Loan, as_of: Timestamp) -> Result<InterestDue> {
        let end = match loan.status.closed_at() {
            Some(closed) => as_of.min(closed),
            None => as_of,
        };
        let elapsed = end.saturating_sub(loan.accrual_checkpoint);
        let (pending, fraction) = accrue(
            loan.outstanding_principal,
            loan.interest_rate_bps,
            elapsed,
            loan.interest_fraction,
        )?;
        Ok(InterestDue {
            amount: loan.interest_carried.try_add(pending)?,
            fraction,
        })
    }

    /// one-off fee charged at origination
    pub fn origination_fee(&self, principal: Amount) -> Result<Amount> {
        self.origination_fee_bps.apply(principal)
    }

    /// principal + unpaid interest + unpaid fee; zero once closed
    pub fn total_owed(&self, loan: &Loan, as_of: Timestamp) -> Result<Amount> {
        if !loan.status.is_active() {
            return Ok(Amount::ZERO);
        }
        loan.outstanding_principal
            .try_add(self.interest_due(loan, as_of)?)?
            .try_add(loan.fee_outstanding)
    }
}

/// Interest over `elapsed_secs` plus a carried fraction, split into whole
/// units and the fraction of a unit left over (1e18 scale, rounded up)
pub fn accrue(principal: Amount, rate: Bps, elapsed_secs: u64, carry: Wad) -> Result<(Amount, Wad)> {
    let denominator = BPS_DENOMINATOR * SECONDS_PER_YEAR as u128;
    let numerator = BigUint::from(principal.0) * BigUint::from(rate.0) * BigUint::from(elapsed_secs);
    let divisor = BigUint::from(denominator);
    let whole = &numerator / &divisor;
    let remainder = u128::try_from(numerator % &divisor).map_err(|_| LendingError::ArithmeticOverflow)?;

    // remainder < denominator, so this stays at or below one unit
    let fraction = math::mul_div_ceil(remainder, WAD, denominator)?
        .checked_add(carry.0)
        .ok_or(LendingError::ArithmeticOverflow)?;
    let whole = u128::try_from(whole)
        .map_err(|_| LendingError::ArithmeticOverflow)?
        .checked_add(fraction / WAD)
        .ok_or(LendingError::ArithmeticOverflow)?;
    Ok((Amount(whole), Wad(fraction % WAD)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LoanStatus;
    use crate::types::{Address, AssetId, LoanId};

    fn loan(principal: u128, rate_bps: u32, start: Timestamp) -> Loan {
        Loan {
            id: LoanId(1),
            borrower: Address::repeat_byte(1),
            borrow_asset: AssetId::new("DAI"),
            principal: Amount(principal),
            outstanding_principal: Amount(principal),
            collateral_asset: AssetId::new("ETH"),
            collateral_amount: Amount(1),
            collateral_seized: Amount::ZERO,
            interest_rate_bps: Bps(rate_bps),
            origination_fee: Amount::ZERO,
            fee_outstanding: Amount::ZERO,
            interest_paid: Amount::ZERO,
            interest_carried: Amount::ZERO,
            interest_fraction: Wad::ZERO,
            accrual_checkpoint: start,
            duration_days: 30,
            start_timestamp: start,
            status: LoanStatus::Active,
        }
    }

    #[test]
    fn test_one_year_at_350_bps() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let l = loan(1000, 350, 0);
        assert_eq!(
            engine.accrued_interest(&l, 365 * SECONDS_PER_DAY).unwrap(),
            Amount(35)
        );
    }

    #[test]
    fn test_clock_skew_accrues_nothing() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let l = loan(1000, 350, 10_000);
        assert_eq!(engine.accrued_interest(&l, 5_000).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_frozen_after_close() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let mut l = loan(1_000_000, 1000, 0);
        l.status = LoanStatus::Repaid {
            at: SECONDS_PER_YEAR,
        };
        let at_close = engine.accrued_interest(&l, SECONDS_PER_YEAR).unwrap();
        assert_eq!(at_close, Amount(100_000));
        assert_eq!(
            engine.accrued_interest(&l, 10 * SECONDS_PER_YEAR).unwrap(),
            at_close
        );
        assert_eq!(engine.total_owed(&l, 10 * SECONDS_PER_YEAR).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_checkpoint_keeps_lifetime_total() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let mut l = loan(1_000_000, 1000, 0);
        let half = SECONDS_PER_YEAR / 2;
        let before = engine.accrued_interest(&l, half).unwrap();

        // pay 20_000 of the 50_000 due and half the principal
        l.interest_paid = Amount(20_000);
        l.interest_carried = Amount(30_000);
        l.accrual_checkpoint = half;
        l.outstanding_principal = Amount(500_000);

        assert_eq!(engine.accrued_interest(&l, half).unwrap(), before);
        assert_eq!(engine.interest_due(&l, half).unwrap(), Amount(30_000));
        // second half accrues on 500_000 only
        assert_eq!(
            engine.accrued_interest(&l, SECONDS_PER_YEAR).unwrap(),
            Amount(75_000)
        );
    }

    #[test]
    fn test_origination_fee_and_total_owed() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let fee = engine.origination_fee(Amount(1000)).unwrap();
        assert_eq!(fee, Amount(1));

        let mut l = loan(1000, 350, 0);
        l.fee_outstanding = fee;
        assert_eq!(
            engine.total_owed(&l, 365 * SECONDS_PER_DAY).unwrap(),
            Amount(1036)
        );
    }

    #[test]
    fn test_fraction_carries_across_checkpoints() {
        // 1000 at 350 bps earns ~0.0959 a day
        let (whole, fraction) = accrue(Amount(1000), Bps(350), SECONDS_PER_DAY, Wad::ZERO).unwrap();
        assert_eq!(whole, Amount::ZERO);
        assert!(fraction > Wad::ZERO);

        let mut total = Amount::ZERO;
        let mut carry = Wad::ZERO;
        for _ in 0..365 {
            let (whole, fraction) = accrue(Amount(1000), Bps(350), SECONDS_PER_DAY, carry).unwrap();
            total = total.try_add(whole).unwrap();
            carry = fraction;
        }
        assert_eq!(total, Amount(35));
    }

    #[test]
    fn test_accrual_reports_carried_fraction() {
        let engine = InterestAccrualEngine::new(Bps(10));
        let mut l = loan(1000, 350, 0);
        l.interest_carried = Amount(2);
        l.interest_fraction = Wad(WAD - 1);

        // the carried fraction tips the next second over a whole unit
        let due = engine.accrual(&l, 1).unwrap();
        assert_eq!(due.amount, Amount(3));
        assert_eq!(engine.interest_due(&l, 1).unwrap(), Amount(3));
        assert!(due.fraction < Wad(WAD - 1));
    }

    #[test]
    fn test_wide_intermediate() {
        // 1e30 principal for 100 years at 100%
        let p = Amount(1_000_000_000_000_000_000_000_000_000_000);
        let (i, fraction) = accrue(p, Bps(10_000), 100 * SECONDS_PER_YEAR, Wad::ZERO).unwrap();
        assert_eq!(i, Amount(p.0 * 100));
        assert_eq!(fraction, Wad::ZERO);
    }
}
