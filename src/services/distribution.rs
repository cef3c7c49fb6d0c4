//! Rollover-aware reward distribution
//!
//! Computes pro-rata shares for eligible holders, executes batched
//! transfers, and carries any undistributable remainder into the next
//! cycle. The undistributed balance is mutated only here, from the single
//! orchestrator timeline or the manual emergency override.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, info, warn};

use crate::config::DistributionConfig;
use crate::core::error::{KeeperError, KeeperResult};
use crate::core::retry::{retry_read, RetryPolicy};
use crate::core::traits::{LedgerClient, MarketDataSource};
use crate::core::types::*;

pub struct DistributionEngine {
    ledger: Arc<dyn LedgerClient>,
    market: Arc<dyn MarketDataSource>,
    config: DistributionConfig,
    token_mint: Pubkey,
    token_decimals: u8,
    retry: RetryPolicy,
    exclusions: Mutex<HashSet<Pubkey>>,
    undistributed: Mutex<UndistributedBalance>,
}

impl DistributionEngine {
    /// The undistributed balance starts from zero on every engine start;
    /// a leftover state file is reported and reset, not replayed.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        market: Arc<dyn MarketDataSource>,
        config: DistributionConfig,
        token_mint: Pubkey,
        token_decimals: u8,
        system_wallets: &[Pubkey],
        retry: RetryPolicy,
    ) -> Self {
        let exclusions: HashSet<Pubkey> = system_wallets.iter().copied().collect();
        info!("Distribution engine initialized with {} exclusions", exclusions.len());

        if let Some(stale) = read_state_file(&config.state_path) {
            if !stale.is_zero() {
                warn!(
                    "Stale undistributed state found ({} of {:?}), resetting to zero",
                    stale.amount, stale.mint
                );
            }
        }
        let engine = Self {
            ledger,
            market,
            config,
            token_mint,
            token_decimals,
            retry,
            exclusions: Mutex::new(exclusions),
            undistributed: Mutex::new(UndistributedBalance::default()),
        };
        engine.persist_undistributed();
        engine
    }

    pub fn undistributed(&self) -> UndistributedBalance {
        self.undistributed.lock().unwrap().clone()
    }

    pub fn add_exclusion(&self, address: Pubkey) {
        self.exclusions.lock().unwrap().insert(address);
        info!("Added {} to the exclusion set", address);
    }

    pub fn remove_exclusion(&self, address: Pubkey) -> bool {
        let removed = self.exclusions.lock().unwrap().remove(&address);
        if removed {
            info!("Removed {} from the exclusion set", address);
        }
        removed
    }

    pub fn exclusions(&self) -> Vec<Pubkey> {
        self.exclusions.lock().unwrap().iter().copied().collect()
    }

    /// Count holders passing the eligibility filters, without touching any
    /// cycle state. Used by the operator holder-refresh trigger.
    pub async fn eligible_holder_count(&self) -> KeeperResult<usize> {
        let holders = retry_read(&self.retry, "holder query", || {
            self.market.token_holders(&self.token_mint, self.config.max_holders)
        })
        .await?;
        let price_usd = retry_read(&self.retry, "price query", || {
            self.market.token_price_usd(&self.token_mint)
        })
        .await?;

        let unit = 10f64.powi(self.token_decimals as i32);
        let exclusions = self.exclusions.lock().unwrap();
        let count = holders
            .iter()
            .filter(|holder| !exclusions.contains(&holder.address))
            .filter(|holder| holder.balance as f64 / unit * price_usd >= self.config.min_holder_value_usd)
            .count();
        Ok(count)
    }

    /// Build the distribution plan for `amount` of `reward_mint`, folding in
    /// a matching-asset carried balance. Zero eligible holders is a valid
    /// outcome: the whole effective amount becomes the next cycle's
    /// undistributed balance and the plan comes back empty.
    pub async fn create_distribution_plan(
        &self,
        amount: u64,
        reward_mint: Pubkey,
    ) -> KeeperResult<DistributionPlan> {
        let carried_in = {
            let undistributed = self.undistributed.lock().unwrap();
            if undistributed.is_zero() {
                0
            } else if undistributed.mint == Some(reward_mint) {
                info!(
                    "Folding in undistributed balance of {} from {}",
                    undistributed.amount, undistributed.last_updated
                );
                undistributed.amount
            } else {
                warn!(
                    "Undistributed balance of {} is denominated in {:?}, not {}; leaving it untouched",
                    undistributed.amount, undistributed.mint, reward_mint
                );
                0
            }
        };
        let total_amount = amount + carried_in;
        if total_amount == 0 {
            return Ok(DistributionPlan {
                total_amount: 0,
                reward_mint,
                eligible_holders: Vec::new(),
                excluded_count: 0,
                undistributed_carried_in: 0,
            });
        }

        let holders = retry_read(&self.retry, "holder query", || {
            self.market.token_holders(&self.token_mint, self.config.max_holders)
        })
        .await?;
        let price_usd = retry_read(&self.retry, "price query", || {
            self.market.token_price_usd(&self.token_mint)
        })
        .await?;

        let unit = 10f64.powi(self.token_decimals as i32);
        let mut excluded_count = 0usize;
        let mut eligible: Vec<TokenHolder> = Vec::new();
        {
            let exclusions = self.exclusions.lock().unwrap();
            for holder in holders {
                if exclusions.contains(&holder.address) {
                    excluded_count += 1;
                    continue;
                }
                let value_usd = holder.balance as f64 / unit * price_usd;
                if value_usd < self.config.min_holder_value_usd {
                    continue;
                }
                eligible.push(holder);
            }
        }

        if eligible.is_empty() {
            warn!(
                "No eligible holders; deferring {} of {} to the next cycle",
                total_amount, reward_mint
            );
            self.record_undistributed(total_amount, reward_mint);
            return Ok(DistributionPlan {
                total_amount,
                reward_mint,
                eligible_holders: Vec::new(),
                excluded_count,
                undistributed_carried_in: carried_in,
            });
        }

        let total_balance: u128 = eligible.iter().map(|h| h.balance as u128).sum();
        let mut shares: Vec<HolderShare> = eligible
            .into_iter()
            .map(|holder| {
                let reward_amount =
                    (total_amount as u128 * holder.balance as u128 / total_balance) as u64;
                let share_bps =
                    (holder.balance as u128 * BPS_DENOMINATOR as u128 / total_balance) as u32;
                HolderShare {
                    address: holder.address,
                    balance: holder.balance,
                    share_bps,
                    reward_amount,
                }
            })
            .collect();

        // Deterministic ordering: descending by reward, address breaks ties
        shares.sort_by(|a, b| {
            b.reward_amount
                .cmp(&a.reward_amount)
                .then_with(|| a.address.cmp(&b.address))
        });

        let planned: u64 = shares.iter().map(|s| s.reward_amount).sum();
        if planned > total_amount {
            return Err(KeeperError::InvariantViolation(format!(
                "planned shares {} exceed total {}",
                planned, total_amount
            )));
        }

        info!(
            "Distribution plan: {} to {} holders ({} excluded, {} carried in)",
            total_amount,
            shares.len(),
            excluded_count,
            carried_in
        );
        Ok(DistributionPlan {
            total_amount,
            reward_mint,
            eligible_holders: shares,
            excluded_count,
            undistributed_carried_in: carried_in,
        })
    }

    /// Execute transfers in fixed-size batches. A failed batch is recorded
    /// per-recipient and later batches continue; failed recipients are not
    /// retried this cycle. The reported total covers succeeded batches only.
    pub async fn execute_distribution(
        &self,
        plan: &DistributionPlan,
    ) -> KeeperResult<DistributionResult> {
        if plan.eligible_holders.is_empty() {
            // Deferral, not failure; the amount was already carried forward.
            return Ok(DistributionResult {
                success: true,
                distributed: 0,
                recipients: 0,
                signatures: Vec::new(),
                failed: Vec::new(),
                undistributed_amount: plan.total_amount,
            });
        }

        let mut result = DistributionResult::default();
        let batches: Vec<&[HolderShare]> = plan
            .eligible_holders
            .chunks(self.config.batch_size)
            .collect();
        info!(
            "Distributing {} to {} recipients in {} batches",
            plan.total_amount,
            plan.eligible_holders.len(),
            batches.len()
        );

        for (index, batch) in batches.iter().enumerate() {
            let transfers: Vec<(Pubkey, u64)> = batch
                .iter()
                .map(|share| (share.address, share.reward_amount))
                .collect();
            let batch_total: u64 = transfers.iter().map(|(_, amount)| amount).sum();

            match self.ledger.transfer_batch(&plan.reward_mint, &transfers).await {
                Ok(receipt) => {
                    result.distributed += batch_total;
                    result.recipients += batch.len();
                    result.signatures.push(receipt.signature.clone());
                    debug!(
                        "Batch {}/{} distributed {} to {} recipients ({})",
                        index + 1,
                        batches.len(),
                        batch_total,
                        batch.len(),
                        receipt.signature
                    );
                }
                Err(err) => {
                    error!("Batch {}/{} failed: {}", index + 1, batches.len(), err);
                    for share in batch.iter() {
                        result.failed.push(FailedTransfer {
                            address: share.address,
                            amount: share.reward_amount,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        result.success = result.failed.is_empty();
        result.undistributed_amount = plan.total_amount - result.distributed;
        info!(
            "Distribution complete: {} distributed to {} recipients, {} failed transfers, {} short",
            result.distributed,
            result.recipients,
            result.failed.len(),
            result.undistributed_amount
        );
        Ok(result)
    }

    /// Fold any shortfall between the plan and what actually moved into the
    /// undistributed balance (never discard value); clear it after a full
    /// distribution.
    pub fn reconcile_undistributed(&self, plan: &DistributionPlan, result: &DistributionResult) {
        let shortfall = plan.total_amount.saturating_sub(result.distributed);
        if shortfall > 0 {
            self.record_undistributed(shortfall, plan.reward_mint);
        } else if plan.undistributed_carried_in > 0 {
            // Only a balance this plan folded in may be cleared; a
            // mismatched-asset balance outlives the cycle untouched.
            self.clear_undistributed();
        }
    }

    /// Manual escape hatch: transfer the entire undistributed balance to
    /// `destination` and zero it. Not part of the automatic cycle.
    pub async fn emergency_withdraw(&self, destination: Pubkey) -> KeeperResult<TxReceipt> {
        let (amount, mint) = {
            let undistributed = self.undistributed.lock().unwrap();
            match undistributed.mint {
                Some(mint) if undistributed.amount > 0 => (undistributed.amount, mint),
                _ => {
                    return Err(KeeperError::Validation(
                        "no undistributed balance to withdraw".to_string(),
                    ))
                }
            }
        };

        warn!(
            "Emergency withdraw requested: {} of {} -> {}",
            amount, mint, destination
        );
        let receipt = self.ledger.transfer(&mint, &destination, amount).await?;
        self.clear_undistributed();
        info!(
            "Emergency withdraw complete: before={} after=0 ({})",
            amount, receipt.signature
        );
        Ok(receipt)
    }

    fn record_undistributed(&self, amount: u64, mint: Pubkey) {
        {
            let mut undistributed = self.undistributed.lock().unwrap();
            if !undistributed.is_zero() && undistributed.mint != Some(mint) {
                // The prior tokens still sit in the vault; only the
                // accounting record is replaced. Operator reconciliation
                // (emergency withdraw) is needed for the old asset.
                error!(
                    "Replacing undistributed record of {} {:?} with {} of {}; prior value needs manual reconciliation",
                    undistributed.amount, undistributed.mint, amount, mint
                );
            }
            *undistributed = UndistributedBalance::record(amount, mint);
        }
        self.persist_undistributed();
        info!("Undistributed balance set to {} of {}", amount, mint);
    }

    fn clear_undistributed(&self) {
        let previous = {
            let mut undistributed = self.undistributed.lock().unwrap();
            let previous = undistributed.amount;
            *undistributed = UndistributedBalance {
                amount: 0,
                mint: None,
                last_updated: Utc::now().timestamp(),
            };
            previous
        };
        self.persist_undistributed();
        if previous > 0 {
            info!("Cleared undistributed balance of {}", previous);
        }
    }

    /// Write-through audit copy; a write failure is logged, never fatal.
    fn persist_undistributed(&self) {
        let snapshot = self.undistributed.lock().unwrap().clone();
        if let Err(err) = write_state_file(&self.config.state_path, &snapshot) {
            error!(
                "Failed to persist undistributed state to {:?}: {}",
                self.config.state_path, err
            );
        }
    }
}

fn read_state_file(path: &PathBuf) -> Option<UndistributedBalance> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_state_file(path: &PathBuf, state: &UndistributedBalance) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(path, content)
}
