//! Deterministic simulated swap router
//!
//! Quotes at a configurable rate per pair and executes with optional
//! per-pair failure injection, so planner and rollback paths are testable
//! without a live aggregator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::adapters::ledger::SimLedger;
use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::{SwapReceipt, SwapRouter};
use crate::core::types::SwapQuote;

/// A rate expressed as out units per in unit, as a fraction
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub num: u64,
    pub den: u64,
}

impl Rate {
    pub fn one_to_one() -> Self {
        Self { num: 1, den: 1 }
    }

    fn apply(&self, amount: u64) -> u64 {
        ((amount as u128 * self.num as u128) / self.den as u128) as u64
    }
}

pub struct SimRouter {
    default_rate: Rate,
    rates: Mutex<HashMap<(Pubkey, Pubkey), Rate>>,
    default_impact_bps: u32,
    impact_overrides: Mutex<HashMap<(Pubkey, Pubkey), u32>>,
    failing_pairs: Mutex<Vec<(Pubkey, Pubkey)>>,
    executed: Mutex<Vec<SwapReceipt>>,
    sequence: AtomicU64,
    /// When set, executed swaps settle against the simulation ledger's
    /// vault balances
    settlement: Mutex<Option<std::sync::Arc<SimLedger>>>,
}

impl SimRouter {
    pub fn new() -> Self {
        Self {
            default_rate: Rate::one_to_one(),
            rates: Mutex::new(HashMap::new()),
            default_impact_bps: 10,
            impact_overrides: Mutex::new(HashMap::new()),
            failing_pairs: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
            settlement: Mutex::new(None),
        }
    }

    pub fn settle_against(&self, ledger: std::sync::Arc<SimLedger>) {
        *self.settlement.lock().unwrap() = Some(ledger);
    }

    pub fn set_rate(&self, from: Pubkey, to: Pubkey, rate: Rate) {
        self.rates.lock().unwrap().insert((from, to), rate);
    }

    pub fn set_price_impact_bps(&self, from: Pubkey, to: Pubkey, impact_bps: u32) {
        self.impact_overrides
            .lock()
            .unwrap()
            .insert((from, to), impact_bps);
    }

    pub fn fail_pair(&self, from: Pubkey, to: Pubkey) {
        self.failing_pairs.lock().unwrap().push((from, to));
    }

    pub fn executed_swaps(&self) -> Vec<SwapReceipt> {
        self.executed.lock().unwrap().clone()
    }

    fn rate_for(&self, from: &Pubkey, to: &Pubkey) -> Rate {
        self.rates
            .lock()
            .unwrap()
            .get(&(*from, *to))
            .copied()
            .unwrap_or(self.default_rate)
    }
}

impl Default for SimRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapRouter for SimRouter {
    async fn get_quote(
        &self,
        from_mint: &Pubkey,
        to_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> KeeperResult<SwapQuote> {
        let rate = self.rate_for(from_mint, to_mint);
        let out_amount = rate.apply(amount);
        let price_impact_bps = self
            .impact_overrides
            .lock()
            .unwrap()
            .get(&(*from_mint, *to_mint))
            .copied()
            .unwrap_or(self.default_impact_bps);

        debug!(
            "Sim quote: {} {} -> {} {} (impact {} bps)",
            amount, from_mint, out_amount, to_mint, price_impact_bps
        );
        Ok(SwapQuote {
            from_mint: *from_mint,
            to_mint: *to_mint,
            in_amount: amount,
            out_amount,
            price_impact_bps,
            slippage_bps,
            route: json!({ "sim": true }),
        })
    }

    async fn execute_swap(&self, quote: &SwapQuote) -> KeeperResult<SwapReceipt> {
        let failing = self.failing_pairs.lock().unwrap();
        if failing.contains(&(quote.from_mint, quote.to_mint)) {
            return Err(KeeperError::External(ExternalError::Rpc(format!(
                "simulated swap failure {} -> {}",
                quote.from_mint, quote.to_mint
            ))));
        }
        drop(failing);

        if let Some(ledger) = self.settlement.lock().unwrap().as_ref() {
            ledger.debit_vault(quote.from_mint, quote.in_amount);
            ledger.credit_vault(quote.to_mint, quote.out_amount);
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let receipt = SwapReceipt {
            signature: format!("sim-swap-{}", seq),
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
        };
        self.executed.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quote_applies_rate() {
        let router = SimRouter::new();
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        router.set_rate(from, to, Rate { num: 1, den: 10 });

        let quote = router.get_quote(&from, &to, 1_000, 100).await.unwrap();
        assert_eq!(quote.out_amount, 100);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let router = SimRouter::new();
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        router.fail_pair(from, to);

        let quote = router.get_quote(&from, &to, 1_000, 100).await.unwrap();
        assert!(router.execute_swap(&quote).await.is_err());
        assert!(router.executed_swaps().is_empty());
    }
}
