//! Simulated market data for development and tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::MarketDataSource;
use crate::core::types::{CandidateAsset, TokenHolder};

pub struct SimMarketData {
    prices: Mutex<HashMap<Pubkey, f64>>,
    holders: Mutex<Vec<TokenHolder>>,
    candidates: Mutex<HashMap<String, Vec<CandidateAsset>>>,
    fail_reads: Mutex<bool>,
}

impl SimMarketData {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            holders: Mutex::new(Vec::new()),
            candidates: Mutex::new(HashMap::new()),
            fail_reads: Mutex::new(false),
        }
    }

    pub fn set_price(&self, mint: Pubkey, usd: f64) {
        self.prices.lock().unwrap().insert(mint, usd);
    }

    pub fn set_holders(&self, holders: Vec<TokenHolder>) {
        *self.holders.lock().unwrap() = holders;
    }

    pub fn set_candidates(&self, symbol: &str, candidates: Vec<CandidateAsset>) {
        self.candidates
            .lock()
            .unwrap()
            .insert(symbol.to_uppercase(), candidates);
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    fn check_failure(&self) -> KeeperResult<()> {
        if *self.fail_reads.lock().unwrap() {
            return Err(KeeperError::External(ExternalError::Http(
                "simulated market data failure".to_string(),
            )));
        }
        Ok(())
    }
}

impl Default for SimMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for SimMarketData {
    async fn token_price_usd(&self, mint: &Pubkey) -> KeeperResult<f64> {
        self.check_failure()?;
        Ok(*self.prices.lock().unwrap().get(mint).unwrap_or(&0.0))
    }

    async fn token_holders(&self, _mint: &Pubkey, limit: usize) -> KeeperResult<Vec<TokenHolder>> {
        self.check_failure()?;
        let holders = self.holders.lock().unwrap();
        Ok(holders.iter().take(limit).cloned().collect())
    }

    async fn search_by_symbol(&self, symbol: &str) -> KeeperResult<Vec<CandidateAsset>> {
        self.check_failure()?;
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_default())
    }
}
