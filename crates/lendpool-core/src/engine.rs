//! Lending pool orchestrator
//!
//! Every operation is one serialized transaction:
//!
//! ```text
//! lock ── price (timeout, fail closed) ── clone state ── mutate copy
//!      ── persist copy ── swap in ── publish events ── unlock
//! ```
//!
//! Any error before the swap leaves the committed state untouched.

use crate::clock::{Clock, SystemClock};
use crate::config::PoolConfig;
use crate::error::{LendingError, Result};
use crate::events::LendingEvent;
use crate::interest::InterestAccrualEngine;
use crate::ledger::{Loan, LoanStatus, NewLoan};
use crate::liquidity::{LiquidityPosition, Withdrawal};
use crate::oracle::PriceOracle;
use crate::request::{LendingRequest, LendingResponse, LiquidationOutcome};
use crate::risk::{CollateralRiskEngine, RiskAssessment};
use crate::store::{EngineState, StateStore};
use crate::types::{Address, Amount, AssetId, Bps, LoanId, Price, Timestamp, Wad};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Loan with its derived, time-dependent figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub accrued_interest: Amount,
    pub interest_due: Amount,
    pub total_owed: Amount,
    pub due_timestamp: Timestamp,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub address: Address,
    pub collateral_deposited: Amount,
    pub collateral_locked: Amount,
    pub free_collateral: Amount,
    pub principal_borrowed: Amount,
    pub active_loan: Option<LoanView>,
    pub loan_history: Vec<LoanId>,
    pub liquidity: Option<LiquidityPosition>,
    pub lp_share: Wad,
    pub claimable_rewards: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub base_asset: AssetId,
    pub collateral_asset: AssetId,
    pub total_liquidity: Amount,
    pub total_borrowed: Amount,
    pub available_liquidity: Amount,
    pub bad_debt: Amount,
    pub written_off: Amount,
    pub utilization: Wad,
    pub apy_bps: Bps,
    pub borrow_rate_bps: Bps,
    pub protocol_reserves: Amount,
    pub undistributed_rewards: Amount,
    pub seized_collateral: Amount,
    pub lifetime_fees: Amount,
    pub providers: usize,
    pub unattributed_share: Wad,
    pub active_loans: usize,
}

pub struct LendingPoolEngine<S, O, C = SystemClock> {
    config: PoolConfig,
    risk: CollateralRiskEngine,
    interest: InterestAccrualEngine,
    store: S,
    oracle: O,
    clock: C,
    state: Mutex<EngineState>,
    events: broadcast::Sender<LendingEvent>,
}

impl<S: StateStore, O: PriceOracle> LendingPoolEngine<S, O, SystemClock> {
    /// Open on the wall clock, see [`LendingPoolEngine::with_clock`]
    pub fn open(config: PoolConfig, store: S, oracle: O) -> Result<Self> {
        Self::with_clock(config, store, oracle, SystemClock)
    }
}

impl<S: StateStore, O: PriceOracle, C: Clock> LendingPoolEngine<S, O, C> {
    /// Resume from the store, or start a seeded genesis pool if it is empty
    pub fn with_clock(config: PoolConfig, store: S, oracle: O, clock: C) -> Result<Self> {
        config.validate()?;

        let mut state = match store.load()? {
            Some(state) => {
                let pool = state.pool.state();
                if pool.base_asset != config.base_asset
                    || pool.collateral_asset != config.collateral_asset
                {
                    return Err(LendingError::InvalidConfig(format!(
                        "store holds a {}/{} pool, config wants {}/{}",
                        pool.base_asset,
                        pool.collateral_asset,
                        config.base_asset,
                        config.collateral_asset
                    )));
                }
                info!(
                    "resumed pool: {} loans, liquidity {}",
                    state.ledger.loan_count(),
                    pool.total_liquidity
                );
                state
            }
            None => {
                let state = EngineState::genesis(&config, clock.now())?;
                store.persist(&state)?;
                info!(
                    "created {}/{} pool with {} seed positions",
                    config.base_asset,
                    config.collateral_asset,
                    config.seed_liquidity.len()
                );
                state
            }
        };
        state.pool.apply_params(config.pool_params());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            risk: config.risk_engine(),
            interest: config.interest_engine(),
            config,
            store,
            oracle,
            clock,
            state: Mutex::new(state),
            events,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// events published after each commit
    pub fn subscribe(&self) -> broadcast::Receiver<LendingEvent> {
        self.events.subscribe()
    }

    /// Run a request on behalf of `caller`
    pub async fn execute(&self, caller: Address, request: LendingRequest) -> Result<LendingResponse> {
        if let Err(e) = request.authorize(&caller) {
            warn!("{} from {} rejected: {}", request.name(), caller, e);
            return Err(e);
        }
        debug!("{} from {}", request.name(), caller);

        match request {
            LendingRequest::DepositCollateral {
                account,
                asset,
                amount,
            } => self
                .deposit_collateral(account, &asset, amount)
                .await
                .map(|free_collateral| LendingResponse::CollateralDeposited { free_collateral }),
            LendingRequest::WithdrawCollateral {
                account,
                asset,
                amount,
            } => self
                .withdraw_collateral(account, &asset, amount)
                .await
                .map(|free_collateral| LendingResponse::CollateralWithdrawn { free_collateral }),
            LendingRequest::CreateLoan {
                borrower,
                principal,
                duration_days,
                collateral_amount,
            } => self
                .create_loan(borrower, principal, duration_days, collateral_amount)
                .await
                .map(|loan_id| LendingResponse::LoanCreated { loan_id }),
            LendingRequest::RepayLoan {
                borrower,
                loan_id,
                amount,
            } => self
                .repay_loan(borrower, loan_id, amount)
                .await
                .map(|remaining_owed| LendingResponse::LoanRepaid { remaining_owed }),
            LendingRequest::Liquidate { loan_id } => self
                .liquidate(caller, loan_id)
                .await
                .map(LendingResponse::Liquidated),
            LendingRequest::ProvideLiquidity { provider, amount } => self
                .provide_liquidity(provider, amount)
                .await
                .map(|share| LendingResponse::LiquidityProvided { share }),
            LendingRequest::WithdrawLiquidity { provider, amount } => self
                .withdraw_liquidity(provider, amount)
                .await
                .map(LendingResponse::LiquidityWithdrawn),
            LendingRequest::ClaimRewards { provider } => self
                .claim_rewards(provider)
                .await
                .map(|amount| LendingResponse::RewardsClaimed { amount }),
        }
    }

    // === collateral ===

    /// Returns the account's free collateral afterwards
    pub async fn deposit_collateral(
        &self,
        account: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let result: Result<Amount> = (|| {
            self.ensure_collateral_asset(asset)?;
            let mut working = state.clone();
            working.ledger.record_collateral_deposit(account, asset, amount)?;
            let free = working.ledger.free_collateral(&account, asset);
            let event = LendingEvent::CollateralDeposited {
                account,
                asset: asset.clone(),
                amount,
            };
            self.commit(&mut state, working, vec![event])?;
            Ok(free)
        })();
        match &result {
            Ok(_) => info!("{} deposited {} {}", account, amount, asset),
            Err(e) => warn!("collateral deposit by {} rejected: {}", account, e),
        }
        result
    }

    /// Returns the account's free collateral afterwards
    pub async fn withdraw_collateral(
        &self,
        account: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let result: Result<Amount> = (|| {
            self.ensure_collateral_asset(asset)?;
            let mut working = state.clone();
            working
                .ledger
                .record_collateral_withdrawal(account, asset, amount)?;
            let free = working.ledger.free_collateral(&account, asset);
            let event = LendingEvent::CollateralWithdrawn {
                account,
                asset: asset.clone(),
                amount,
            };
            self.commit(&mut state, working, vec![event])?;
            Ok(free)
        })();
        match &result {
            Ok(_) => info!("{} withdrew {} {}", account, amount, asset),
            Err(e) => warn!("collateral withdrawal by {} rejected: {}", account, e),
        }
        result
    }

    // === loans ===

    /// Deposit `collateral_amount`, lock it and borrow `principal` against it
    pub async fn create_loan(
        &self,
        borrower: Address,
        principal: Amount,
        duration_days: u32,
        collateral_amount: Amount,
    ) -> Result<LoanId> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let result = self
            .open_loan(&mut state, borrower, principal, duration_days, collateral_amount, now)
            .await;
        if let Err(e) = &result {
            warn!("loan request by {} rejected: {}", borrower, e);
        }
        result
    }

    async fn open_loan(
        &self,
        state: &mut EngineState,
        borrower: Address,
        principal: Amount,
        duration_days: u32,
        collateral_amount: Amount,
        now: Timestamp,
    ) -> Result<LoanId> {
        if principal.is_zero() || collateral_amount.is_zero() {
            return Err(LendingError::InvalidAmount);
        }
        let (min, max) = (self.config.min_duration_days, self.config.max_duration_days);
        if duration_days < min || duration_days > max {
            return Err(LendingError::InvalidDuration {
                days: duration_days,
                min,
                max,
            });
        }

        let collateral_asset = self.config.collateral_asset.clone();
        let price = self.price(&collateral_asset, now).await?;
        self.risk
            .ensure_can_open_loan(principal, collateral_amount, &price)?;
        let origination_fee = self.interest.origination_fee(principal)?;

        let mut working = state.clone();
        working
            .ledger
            .record_collateral_deposit(borrower, &collateral_asset, collateral_amount)?;
        let loan_id = working.ledger.record_loan_open(
            borrower,
            NewLoan {
                borrow_asset: self.config.base_asset.clone(),
                collateral_asset,
                principal,
                collateral_amount,
                interest_rate_bps: self.config.interest_rate_bps,
                origination_fee,
                duration_days,
                start_timestamp: now,
            },
        )?;
        working.pool.record_borrow(principal)?;

        let due = working
            .ledger
            .loan(loan_id)
            .map(Loan::due_timestamp)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        let event = LendingEvent::LoanOpened {
            loan_id,
            borrower,
            principal,
            collateral: collateral_amount,
            origination_fee,
            due,
        };
        self.commit(state, working, vec![event])?;

        info!(
            "loan {} opened: {} borrowed {} against {} collateral at {}",
            loan_id, borrower, principal, collateral_amount, price
        );
        Ok(loan_id)
    }

    /// Apply a payment and return what is still owed
    pub async fn repay_loan(&self, borrower: Address, loan_id: LoanId, amount: Amount) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let result = self.apply_repayment(&mut state, borrower, loan_id, amount, now);
        if let Err(e) = &result {
            warn!("repayment of {} by {} rejected: {}", loan_id, borrower, e);
        }
        result
    }

    fn apply_repayment(
        &self,
        state: &mut EngineState,
        borrower: Address,
        loan_id: LoanId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Amount> {
        let loan = state
            .ledger
            .loan(loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        if loan.borrower != borrower {
            return Err(LendingError::Unauthorized);
        }
        if !loan.status.is_active() {
            return Err(LendingError::LoanNotActive(loan_id));
        }
        let accrued = self.interest.accrual(loan, now)?;

        let mut working = state.clone();
        let breakdown = working
            .ledger
            .record_repayment(borrower, loan_id, amount, accrued, now)?;
        working.pool.record_principal_repaid(breakdown.principal)?;
        working.pool.accrue_fees(breakdown.income()?)?;

        let closed = breakdown.remaining_owed.is_zero();
        if closed {
            working
                .ledger
                .close_loan(loan_id, LoanStatus::Repaid { at: now })?;
        }

        let event = LendingEvent::LoanRepaid {
            loan_id,
            borrower,
            interest: breakdown.interest,
            fee: breakdown.fee,
            principal: breakdown.principal,
            remaining_owed: breakdown.remaining_owed,
            closed,
        };
        self.commit(state, working, vec![event])?;

        info!(
            "loan {} repayment of {}: interest {}, fee {}, principal {}, remaining {}",
            loan_id,
            amount,
            breakdown.interest,
            breakdown.fee,
            breakdown.principal,
            breakdown.remaining_owed
        );
        if closed {
            info!("loan {} repaid in full", loan_id);
        }
        Ok(breakdown.remaining_owed)
    }

    /// Liquidate an unhealthy loan. Open to any caller.
    pub async fn liquidate(&self, liquidator: Address, loan_id: LoanId) -> Result<LiquidationOutcome> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let result = self.seize(&mut state, liquidator, loan_id, now).await;
        if let Err(e) = &result {
            warn!("liquidation of {} by {} rejected: {}", loan_id, liquidator, e);
        }
        result
    }

    async fn seize(
        &self,
        state: &mut EngineState,
        liquidator: Address,
        loan_id: LoanId,
        now: Timestamp,
    ) -> Result<LiquidationOutcome> {
        let loan = state
            .ledger
            .loan(loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?
            .clone();
        if !loan.status.is_active() {
            return Err(LendingError::LoanNotActive(loan_id));
        }

        let price = self.price(&loan.collateral_asset, now).await?;
        let debt = self.interest.total_owed(&loan, now)?;
        let assessment = self.risk.assess(debt, loan.collateral_amount, &price)?;
        if !assessment.liquidatable {
            return Err(LendingError::NotEligibleForLiquidation(loan_id));
        }

        let seized = self
            .risk
            .liquidation_seizure(debt, loan.collateral_amount, &price)?;
        let proceeds = price.value_of(seized)?;
        let principal_recovered = proceeds.min(loan.outstanding_principal);
        let income = proceeds.try_sub(principal_recovered)?;

        let mut working = state.clone();
        working.ledger.seize_collateral(loan_id, seized)?;
        working
            .ledger
            .close_loan(loan_id, LoanStatus::Liquidated { at: now })?;
        let bad_debt =
            working
                .pool
                .record_liquidation(loan.outstanding_principal, principal_recovered, seized)?;
        working.pool.accrue_fees(income)?;

        let outcome = LiquidationOutcome {
            loan_id,
            borrower: loan.borrower,
            debt,
            collateral_seized: seized,
            collateral_returned: loan.collateral_amount.try_sub(seized)?,
            proceeds,
            principal_recovered,
            income,
            bad_debt,
            health_factor: assessment.health_factor,
        };
        let event = LendingEvent::LoanLiquidated {
            loan_id,
            borrower: loan.borrower,
            liquidator,
            collateral_seized: seized,
            debt_recovered: proceeds.min(debt),
            bad_debt,
        };
        self.commit(state, working, vec![event])?;

        info!(
            "loan {} liquidated at hf {}: seized {} of {} collateral, proceeds {}",
            loan_id, assessment.health_factor, seized, loan.collateral_amount, proceeds
        );
        if !bad_debt.is_zero() {
            warn!("loan {} left {} bad debt", loan_id, bad_debt);
        }
        Ok(outcome)
    }

    // === liquidity ===

    /// Returns the provider's new share of the pool
    pub async fn provide_liquidity(&self, provider: Address, amount: Amount) -> Result<Wad> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let result: Result<Wad> = (|| {
            let mut working = state.clone();
            let share = working.pool.provide_liquidity(provider, amount, now)?;
            let event = LendingEvent::LiquidityProvided {
                provider,
                amount,
                share,
            };
            self.commit(&mut state, working, vec![event])?;
            Ok(share)
        })();
        match &result {
            Ok(share) => info!("{} provided {} liquidity, share {}", provider, amount, share.percent()),
            Err(e) => warn!("liquidity deposit by {} rejected: {}", provider, e),
        }
        result
    }

    pub async fn withdraw_liquidity(&self, provider: Address, amount: Amount) -> Result<Withdrawal> {
        let mut state = self.state.lock().await;
        let result: Result<Withdrawal> = (|| {
            let mut working = state.clone();
            let withdrawal = working.pool.withdraw_liquidity(provider, amount)?;
            let event = LendingEvent::LiquidityWithdrawn {
                provider,
                amount,
                fee: withdrawal.fee,
                remaining: withdrawal.remaining,
            };
            self.commit(&mut state, working, vec![event])?;
            Ok(withdrawal)
        })();
        match &result {
            Ok(w) => info!(
                "{} withdrew {} liquidity (fee {}), {} remaining",
                provider, amount, w.fee, w.remaining
            ),
            Err(e) => warn!("liquidity withdrawal by {} rejected: {}", provider, e),
        }
        result
    }

    pub async fn claim_rewards(&self, provider: Address) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let result: Result<Amount> = (|| {
            let mut working = state.clone();
            let amount = working.pool.claim_rewards(provider)?;
            let event = LendingEvent::RewardsClaimed { provider, amount };
            self.commit(&mut state, working, vec![event])?;
            Ok(amount)
        })();
        match &result {
            Ok(amount) => info!("{} claimed {} rewards", provider, amount),
            Err(e) => warn!("reward claim by {} rejected: {}", provider, e),
        }
        result
    }

    // === queries ===

    pub async fn get_account(&self, address: &Address) -> Result<AccountSnapshot> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        let asset = &self.config.collateral_asset;
        let account = state.ledger.account(address);

        let active_loan = match state.ledger.active_loan_of(address) {
            Some(loan) => Some(self.loan_view(loan, now)?),
            None => None,
        };
        Ok(AccountSnapshot {
            address: *address,
            collateral_deposited: account.map(|a| a.deposited(asset)).unwrap_or_default(),
            collateral_locked: account.map(|a| a.locked(asset)).unwrap_or_default(),
            free_collateral: state.ledger.free_collateral(address, asset),
            principal_borrowed: account
                .map(|a| a.borrowed(&self.config.base_asset))
                .unwrap_or_default(),
            active_loan,
            loan_history: account.map(|a| a.loan_history.clone()).unwrap_or_default(),
            liquidity: state.pool.position(address).cloned(),
            lp_share: state.pool.share_of(address)?,
            claimable_rewards: state.pool.claimable_rewards(address)?,
        })
    }

    pub async fn get_pool(&self) -> Result<PoolSnapshot> {
        let state = self.state.lock().await;
        let pool = state.pool.state();
        Ok(PoolSnapshot {
            base_asset: pool.base_asset.clone(),
            collateral_asset: pool.collateral_asset.clone(),
            total_liquidity: pool.total_liquidity,
            total_borrowed: pool.total_borrowed,
            available_liquidity: state.pool.available_liquidity(),
            bad_debt: pool.bad_debt,
            written_off: pool.written_off,
            utilization: state.pool.utilization()?,
            apy_bps: state.pool.apy_bps()?,
            borrow_rate_bps: self.config.interest_rate_bps,
            protocol_reserves: pool.protocol_reserves,
            undistributed_rewards: pool.undistributed_rewards,
            seized_collateral: pool.seized_collateral,
            lifetime_fees: pool.lifetime_fees,
            providers: state.pool.positions().count(),
            unattributed_share: state.pool.unattributed_share()?,
            active_loans: state.ledger.active_loans().count(),
        })
    }

    pub async fn loan(&self, loan_id: LoanId) -> Result<LoanView> {
        let state = self.state.lock().await;
        let loan = state
            .ledger
            .loan(loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        self.loan_view(loan, self.clock.now())
    }

    /// every loan of `address`, oldest first
    pub async fn loans_of(&self, address: &Address) -> Result<Vec<LoanView>> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        state
            .ledger
            .loans_of(address)
            .into_iter()
            .map(|loan| self.loan_view(loan, now))
            .collect()
    }

    /// Current health factor of a loan at the oracle price
    pub async fn health_factor(&self, loan_id: LoanId) -> Result<Wad> {
        self.assess_loan(loan_id).await.map(|a| a.health_factor)
    }

    pub async fn assess_loan(&self, loan_id: LoanId) -> Result<RiskAssessment> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        let loan = state
            .ledger
            .loan(loan_id)
            .ok_or(LendingError::UnknownLoan(loan_id))?;
        let price = self.price(&loan.collateral_asset, now).await?;
        let owed = self.interest.total_owed(loan, now)?;
        self.risk.assess(owed, loan.collateral_amount, &price)
    }

    /// clone of the committed state
    pub async fn snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    // === internals ===

    fn ensure_collateral_asset(&self, asset: &AssetId) -> Result<()> {
        if *asset != self.config.collateral_asset {
            return Err(LendingError::UnsupportedAsset(asset.to_string()));
        }
        Ok(())
    }

    /// Fetch and validate a quote, bounded by the oracle timeout
    async fn price(&self, asset: &AssetId, now: Timestamp) -> Result<Price> {
        let timeout = self.config.oracle.timeout();
        let quote = match tokio::time::timeout(timeout, self.oracle.get_price(asset)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(LendingError::PriceUnavailable(reason))) => {
                return Err(LendingError::PriceUnavailable(reason))
            }
            Ok(Err(e)) => return Err(LendingError::PriceUnavailable(e.to_string())),
            Err(_) => {
                return Err(LendingError::PriceUnavailable(format!(
                    "oracle timed out after {:?}",
                    timeout
                )))
            }
        };
        let price = self.risk.validated_price(asset, Some(quote), now)?;
        debug!("price of {}: {} (quoted at {})", asset, price, quote.timestamp);
        Ok(price)
    }

    fn loan_view(&self, loan: &Loan, now: Timestamp) -> Result<LoanView> {
        Ok(LoanView {
            accrued_interest: self.interest.accrued_interest(loan, now)?,
            interest_due: self.interest.interest_due(loan, now)?,
            total_owed: self.interest.total_owed(loan, now)?,
            due_timestamp: loan.due_timestamp(),
            overdue: loan.is_overdue(now),
            loan: loan.clone(),
        })
    }

    /// Persist the working copy, then make it the committed state
    fn commit(
        &self,
        committed: &mut EngineState,
        working: EngineState,
        events: Vec<LendingEvent>,
    ) -> Result<()> {
        self.store.persist(&working)?;
        *committed = working;
        for event in events {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        Ok(())
    }
}
