//! Account ledger
//!
//! Owns per-address collateral balances and every loan ever opened.
//! Pure bookkeeping: prices, interest and pool totals are supplied by the
//! caller.

use crate::error::{LendingError, Result};
use crate::interest::{InterestDue, SECONDS_PER_DAY};
use crate::types::{Address, Amount, AssetId, Bps, LoanId, Timestamp, Wad};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Loan lifecycle: `Active -> Repaid | Liquidated`, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Repaid { at: Timestamp },
    Liquidated { at: Timestamp },
}

impl LoanStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Active)
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        match self {
            LoanStatus::Active => None,
            LoanStatus::Repaid { at } | LoanStatus::Liquidated { at } => Some(*at),
        }
    }

    /// Move to a terminal state. Only `Active` may transition.
    pub fn transition(&mut self, loan_id: LoanId, to: LoanStatus) -> Result<()> {
        if !self.is_active() || to.is_active() {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        *self = to;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: Address,
    pub borrow_asset: AssetId,
    /// principal at origination
    pub principal: Amount,
    pub outstanding_principal: Amount,
    pub collateral_asset: AssetId,
    /// collateral still backing the loan (after any seizure)
    pub collateral_amount: Amount,
    pub collateral_seized: Amount,
    pub interest_rate_bps: Bps,
    pub origination_fee: Amount,
    pub fee_outstanding: Amount,
    pub interest_paid: Amount,
    /// accrued but unpaid as of `accrual_checkpoint`
    pub interest_carried: Amount,
    /// sub-unit interest carried past `accrual_checkpoint` (1e18 scale)
    pub interest_fraction: Wad,
    pub accrual_checkpoint: Timestamp,
    pub duration_days: u32,
    pub start_timestamp: Timestamp,
    pub status: LoanStatus,
}

impl Loan {
    pub fn repaid(&self) -> bool {
        !self.status.is_active()
    }

    pub fn due_timestamp(&self) -> Timestamp {
        self.start_timestamp
            .saturating_add(self.duration_days as u64 * SECONDS_PER_DAY)
    }

    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status.is_active() && now > self.due_timestamp()
    }
}

/// Parameters for a new loan, validated by the risk engine beforehand
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub borrow_asset: AssetId,
    pub collateral_asset: AssetId,
    pub principal: Amount,
    pub collateral_amount: Amount,
    pub interest_rate_bps: Bps,
    pub origination_fee: Amount,
    pub duration_days: u32,
    pub start_timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// all collateral held for the address, locked or free
    pub collateral_deposited: BTreeMap<AssetId, Amount>,
    /// collateral backing the active loan
    pub collateral_locked: BTreeMap<AssetId, Amount>,
    pub principal_borrowed: BTreeMap<AssetId, Amount>,
    pub active_loan: Option<LoanId>,
    pub loan_history: Vec<LoanId>,
}

impl Account {
    fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn deposited(&self, asset: &AssetId) -> Amount {
        balance(&self.collateral_deposited, asset)
    }

    pub fn locked(&self, asset: &AssetId) -> Amount {
        balance(&self.collateral_locked, asset)
    }

    pub fn borrowed(&self, asset: &AssetId) -> Amount {
        balance(&self.principal_borrowed, asset)
    }

    /// withdrawable collateral
    pub fn free_collateral(&self, asset: &AssetId) -> Amount {
        self.deposited(asset).saturating_sub(self.locked(asset))
    }
}

/// How a repayment was split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentBreakdown {
    pub interest: Amount,
    pub fee: Amount,
    pub principal: Amount,
    pub remaining_owed: Amount,
}

impl RepaymentBreakdown {
    /// the part of the payment that is pool income rather than principal
    pub fn income(&self) -> Result<Amount> {
        self.interest.try_add(self.fee)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedger {
    accounts: BTreeMap<Address, Account>,
    loans: BTreeMap<LoanId, Loan>,
    next_loan_id: u64,
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountLedger {
    pub fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
            loans: BTreeMap::new(),
            next_loan_id: 1,
        }
    }

    pub fn record_collateral_deposit(
        &mut self,
        address: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let account = self
            .accounts
            .entry(address)
            .or_insert_with(|| Account::new(address));
        credit(&mut account.collateral_deposited, asset, amount)
    }

    pub fn record_collateral_withdrawal(
        &mut self,
        address: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let free = self.free_collateral(&address, asset);
        if amount > free {
            return Err(LendingError::InsufficientCollateral {
                required: amount,
                available: free,
            });
        }
        let account = self
            .accounts
            .get_mut(&address)
            .ok_or(LendingError::InsufficientCollateral {
                required: amount,
                available: Amount::ZERO,
            })?;
        debit(&mut account.collateral_deposited, asset, amount)
    }

    /// Open a loan for `address`, locking its collateral from the free balance
    pub fn record_loan_open(&mut self, address: Address, new: NewLoan) -> Result<LoanId> {
        if new.principal.is_zero() || new.collateral_amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        if let Some(existing) = self.accounts.get(&address).and_then(|a| a.active_loan) {
            return Err(LendingError::DuplicateActiveLoan(existing));
        }
        let free = self.free_collateral(&address, &new.collateral_asset);
        if new.collateral_amount > free {
            return Err(LendingError::InsufficientCollateral {
                required: new.collateral_amount,
                available: free,
            });
        }

        let id = LoanId(self.next_loan_id);
        self.next_loan_id = self
            .next_loan_id
            .checked_add(1)
            .ok_or(LendingError::ArithmeticOverflow)?;

        let account = self
            .accounts
            .entry(address)
            .or_insert_with(|| Account::new(address));
        credit(
            &mut account.collateral_locked,
            &new.collateral_asset,
            new.collateral_amount,
        )?;
        credit(
            &mut account.principal_borrowed,
            &new.borrow_asset,
            new.principal,
        )?;
        account.active_loan = Some(id);
        account.loan_history.push(id);

        self.loans.insert(
            id,
            Loan {
                id,
                borrower: address,
                borrow_asset: new.borrow_asset,
                principal: new.principal,
                outstanding_principal: new.principal,
                collateral_asset: new.collateral_asset,
                collateral_amount: new.collateral_amount,
                collateral_seized: Amount::ZERO,
                interest_rate_bps: new.interest_rate_bps,
                origination_fee: new.origination_fee,
                fee_outstanding: new.origination_fee,
                interest_paid: Amount::ZERO,
                interest_carried: Amount::ZERO,
                interest_fraction: Wad::ZERO,
                accrual_checkpoint: new.start_timestamp,
                duration_days: new.duration_days,
                start_timestamp: new.start_timestamp,
                status: LoanStatus::Active,
            },
        );
        Ok(id)
    }

    /// Apply a payment: interest first, then the origination fee, then
    /// principal. Payments above the total owed are rejected.
    ///
    /// `interest_due` is the unpaid interest as of `now`; its sub-unit
    /// fraction is carried to the next checkpoint. Does not close the
    /// loan; the caller does that once `remaining_owed` reaches zero.
    pub fn record_repayment(
        &mut self,
        address: Address,
        loan_id: LoanId,
        amount: Amount,
        interest_due: InterestDue,
        now: Timestamp,
    ) -> Result<RepaymentBreakdown> {
        if amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        if loan.borrower != address {
            return Err(LendingError::Unauthorized);
        }
        if !loan.status.is_active() {
            return Err(LendingError::LoanNotActive(loan_id));
        }

        let owed = loan
            .outstanding_principal
            .try_add(interest_due.amount)?
            .try_add(loan.fee_outstanding)?;
        if amount > owed {
            return Err(LendingError::OverRepayment { paid: amount, owed });
        }

        let interest = amount.min(interest_due.amount);
        let mut rest = amount.try_sub(interest)?;
        let fee = rest.min(loan.fee_outstanding);
        rest = rest.try_sub(fee)?;
        let principal = rest;

        // checkpoint: everything accrued so far is now either paid or carried
        loan.interest_paid = loan.interest_paid.try_add(interest)?;
        loan.interest_carried = interest_due.amount.try_sub(interest)?;
        loan.interest_fraction = interest_due.fraction;
        loan.accrual_checkpoint = loan.accrual_checkpoint.max(now);
        loan.fee_outstanding = loan.fee_outstanding.try_sub(fee)?;
        loan.outstanding_principal = loan.outstanding_principal.try_sub(principal)?;

        let borrow_asset = loan.borrow_asset.clone();
        if let Some(account) = self.accounts.get_mut(&address) {
            debit(&mut account.principal_borrowed, &borrow_asset, principal)?;
        }

        Ok(RepaymentBreakdown {
            interest,
            fee,
            principal,
            remaining_owed: owed.try_sub(amount)?,
        })
    }

    /// Mark a loan closed and release its remaining collateral.
    ///
    /// Returns `Ok(false)` without changes if the loan is already closed.
    pub fn close_loan(&mut self, loan_id: LoanId, status: LoanStatus) -> Result<bool> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        if !loan.status.is_active() {
            return Ok(false);
        }
        loan.status.transition(loan_id, status)?;

        if let Some(account) = self.accounts.get_mut(&loan.borrower) {
            debit(
                &mut account.collateral_locked,
                &loan.collateral_asset,
                loan.collateral_amount,
            )?;
            let borrowed = balance(&account.principal_borrowed, &loan.borrow_asset);
            debit(
                &mut account.principal_borrowed,
                &loan.borrow_asset,
                borrowed.min(loan.outstanding_principal),
            )?;
            if account.active_loan == Some(loan_id) {
                account.active_loan = None;
            }
        }
        Ok(true)
    }

    /// Remove collateral from an active loan and its borrower's balance
    pub fn seize_collateral(&mut self, loan_id: LoanId, amount: Amount) -> Result<()> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        if !loan.status.is_active() {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        if amount > loan.collateral_amount {
            return Err(LendingError::InsufficientCollateral {
                required: amount,
                available: loan.collateral_amount,
            });
        }
        loan.collateral_amount = loan.collateral_amount.try_sub(amount)?;
        loan.collateral_seized = loan.collateral_seized.try_add(amount)?;

        let account = self
            .accounts
            .get_mut(&loan.borrower)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        debit(&mut account.collateral_locked, &loan.collateral_asset, amount)?;
        debit(&mut account.collateral_deposited, &loan.collateral_asset, amount)
    }

    // === queries ===

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans.get(&loan_id)
    }

    pub fn active_loan_of(&self, address: &Address) -> Option<&Loan> {
        self.accounts
            .get(address)
            .and_then(|a| a.active_loan)
            .and_then(|id| self.loans.get(&id))
    }

    /// every loan the address opened, oldest first
    pub fn loans_of(&self, address: &Address) -> Vec<&Loan> {
        self.accounts
            .get(address)
            .map(|a| a.loan_history.iter().filter_map(|id| self.loans.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn free_collateral(&self, address: &Address, asset: &AssetId) -> Amount {
        self.accounts
            .get(address)
            .map(|a| a.free_collateral(asset))
            .unwrap_or(Amount::ZERO)
    }

    pub fn active_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|l| l.status.is_active())
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }
}

fn balance(map: &BTreeMap<AssetId, Amount>, asset: &AssetId) -> Amount {
    map.get(asset).copied().unwrap_or(Amount::ZERO)
}

fn credit(map: &mut BTreeMap<AssetId, Amount>, asset: &AssetId, amount: Amount) -> Result<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let entry = map.entry(asset.clone()).or_insert(Amount::ZERO);
    *entry = entry.try_add(amount)?;
    Ok(())
}

fn debit(map: &mut BTreeMap<AssetId, Amount>, asset: &AssetId, amount: Amount) -> Result<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let current = balance(map, asset);
    let next = current.try_sub(amount)?;
    if next.is_zero() {
        map.remove(asset);
    } else {
        map.insert(asset.clone(), next);
    }
    Ok(())
}
