//! state persistence
//!
//! The engine hands the store a complete working copy before swapping it in,
//! so a store failure leaves the committed state as it was.
//!
//! ```text
//! EngineState
//! ├── ledger: accounts, loans, next loan id
//! └── pool: totals, reward index, LP positions, params
//! ```

use crate::config::PoolConfig;
use crate::error::Result;
use crate::ledger::AccountLedger;
use crate::liquidity::LiquidityPoolEngine;
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const STATE_KEY: &[u8] = b"engine_state";

/// everything the engine owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub ledger: AccountLedger,
    pub pool: LiquidityPoolEngine,
}

impl EngineState {
    /// fresh pool with the configured seed liquidity
    pub fn genesis(config: &PoolConfig, now: Timestamp) -> Result<Self> {
        let mut pool = LiquidityPoolEngine::new(
            config.base_asset.clone(),
            config.collateral_asset.clone(),
            config.pool_params(),
        );
        for seed in &config.seed_liquidity {
            pool.provide_liquidity(seed.provider, seed.amount, now)?;
        }
        Ok(Self {
            ledger: AccountLedger::new(),
            pool,
        })
    }
}

/// storage backend trait
pub trait StateStore: Send + Sync {
    /// last persisted state, `None` for a fresh store
    fn load(&self) -> Result<Option<EngineState>>;

    /// durably replace the stored state
    fn persist(&self, state: &EngineState) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn load(&self) -> Result<Option<EngineState>> {
        (**self).load()
    }

    fn persist(&self, state: &EngineState) -> Result<()> {
        (**self).persist(state)
    }
}

/// in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Option<EngineState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<EngineState>> {
        Ok(self.state.read().clone())
    }

    fn persist(&self, state: &EngineState) -> Result<()> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }
}

/// sled-backed store, state kept as one bincode value
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening state store at {}", path.display());
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl StateStore for SledStore {
    fn load(&self) -> Result<Option<EngineState>> {
        match self.db.get(STATE_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, state: &EngineState) -> Result<()> {
        let bytes = bincode::serialize(state)?;
        self.db.insert(STATE_KEY, bytes.as_slice())?;
        self.db.flush()?;
        debug!("persisted engine state ({} bytes)", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedPosition;
    use crate::types::{Address, Amount};

    fn seeded_config() -> PoolConfig {
        PoolConfig {
            seed_liquidity: vec![SeedPosition {
                provider: Address::repeat_byte(7),
                amount: Amount(10_000),
            }],
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_genesis_applies_seed() {
        let state = EngineState::genesis(&seeded_config(), 42).unwrap();
        assert_eq!(state.pool.state().total_liquidity, Amount(10_000));
        let position = state.pool.position(&Address::repeat_byte(7)).unwrap();
        assert_eq!(position.opened_at, 42);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        let state = EngineState::genesis(&seeded_config(), 0).unwrap();
        store.persist(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = EngineState::genesis(&seeded_config(), 0).unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            assert!(store.load().unwrap().is_none());
            store.persist(&state).unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }
}
