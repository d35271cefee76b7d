//! price oracle seam
//!
//! The engine asks for one quote per price-sensitive operation and fails
//! closed on any error. Retry lives here, never in the engine.

use crate::config::OracleConfig;
use crate::error::{LendingError, Result};
use crate::types::{AssetId, Price, PriceQuote, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// current quote for `asset` in base-asset units per collateral unit
    async fn get_price(&self, asset: &AssetId) -> Result<PriceQuote>;
}

#[async_trait]
impl<O: PriceOracle + ?Sized> PriceOracle for Arc<O> {
    async fn get_price(&self, asset: &AssetId) -> Result<PriceQuote> {
        (**self).get_price(asset).await
    }
}

/// Fixed quotes, updated by hand
#[derive(Debug, Default)]
pub struct StaticOracle {
    quotes: RwLock<BTreeMap<AssetId, PriceQuote>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, asset: AssetId, price: Price, timestamp: Timestamp) -> Self {
        self.set_price(asset, price, timestamp);
        self
    }

    pub fn set_price(&self, asset: AssetId, price: Price, timestamp: Timestamp) {
        self.quotes
            .write()
            .insert(asset, PriceQuote { price, timestamp });
    }

    pub fn remove_price(&self, asset: &AssetId) {
        self.quotes.write().remove(asset);
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn get_price(&self, asset: &AssetId) -> Result<PriceQuote> {
        self.quotes
            .read()
            .get(asset)
            .copied()
            .ok_or_else(|| LendingError::PriceUnavailable(format!("no quote for {}", asset)))
    }
}

/// Retries a flaky oracle with a per-attempt timeout and exponential
/// backoff (100ms, 200ms, 400ms with the default config)
pub struct RetryingOracle<O> {
    inner: O,
    attempts: u32,
    attempt_timeout: Duration,
    backoff_base: Duration,
}

impl<O: PriceOracle> RetryingOracle<O> {
    pub fn new(inner: O, config: &OracleConfig) -> Self {
        Self {
            inner,
            attempts: config.retry_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            backoff_base: config.backoff_base(),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: PriceOracle> PriceOracle for RetryingOracle<O> {
    async fn get_price(&self, asset: &AssetId) -> Result<PriceQuote> {
        let mut last_err = LendingError::PriceUnavailable(format!("no attempt for {}", asset));
        for attempt in 0..self.attempts {
            match tokio::time::timeout(self.attempt_timeout, self.inner.get_price(asset)).await {
                Ok(Ok(quote)) => return Ok(quote),
                Ok(Err(e)) => last_err = e,
                Err(_) => {
                    last_err = LendingError::PriceUnavailable(format!(
                        "oracle timed out after {:?}",
                        self.attempt_timeout
                    ))
                }
            }
            warn!(
                "price lookup for {} failed (attempt {}/{}): {}",
                asset,
                attempt + 1,
                self.attempts,
                last_err
            );
            if attempt + 1 < self.attempts {
                tokio::time::sleep(self.backoff_base * (1u32 << attempt.min(16))).await;
            }
        }
        Err(last_err)
    }
}
