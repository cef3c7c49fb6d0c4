//! Harvest threshold and lock coordination
//!
//! The harvest lock is the one shared mutable resource requiring
//! cross-instance exclusion. Acquisition is a single acquire-or-fail call
//! against durable ledger state, and release happens on every exit path of
//! `harvest`, including batch failures.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::core::error::{KeeperError, KeeperResult};
use crate::core::retry::{retry_read, RetryPolicy};
use crate::core::traits::LedgerClient;
use crate::core::types::{HarvestOutcome, WithheldFeesSnapshot};
use solana_sdk::pubkey::Pubkey;

pub struct HarvestCoordinator {
    ledger: Arc<dyn LedgerClient>,
    config: HarvestConfig,
    retry: RetryPolicy,
    token_mint: Pubkey,
}

impl HarvestCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        config: HarvestConfig,
        retry: RetryPolicy,
        token_mint: Pubkey,
    ) -> Self {
        Self {
            ledger,
            config,
            retry,
            token_mint,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.config.threshold
    }

    /// Point-in-time withheld snapshot. Read-only, retried on transient
    /// failures.
    pub async fn query_withheld(&self) -> KeeperResult<WithheldFeesSnapshot> {
        retry_read(&self.retry, "withheld query", || {
            self.ledger.query_withheld_fees()
        })
        .await
    }

    /// True when the lock is free and enough value is available. Fees
    /// already sitting in the vault (from an earlier partial cycle) count
    /// toward the threshold so stranded value is re-discovered.
    pub async fn should_harvest(&self) -> KeeperResult<bool> {
        let lock = self.ledger.harvest_lock_state().await?;
        if lock.held {
            debug!("Harvest lock held by {:?}, skipping", lock.holder);
            return Ok(false);
        }

        let vault_balance = self.ledger.vault_balance(&self.token_mint).await?;
        if vault_balance >= self.config.threshold {
            info!(
                "Vault already holds {} (threshold {}), proceeding without new harvest",
                vault_balance, self.config.threshold
            );
            return Ok(true);
        }

        let snapshot = self.query_withheld().await?;
        Ok(snapshot.total_withheld + vault_balance >= self.config.threshold)
    }

    /// Acquire the lock, re-check the threshold, harvest in fixed-size
    /// batches, withdraw mint-level fees, and release the lock on every
    /// path. A batch failure aborts remaining batches; confirmed batches
    /// stand (partial harvest is valid and simply shrinks this cycle).
    pub async fn harvest(&self) -> KeeperResult<HarvestOutcome> {
        let holder = self.config.lock_holder.as_str();
        let acquired = self.ledger.try_acquire_harvest_lock(holder).await?;
        if !acquired {
            let state = self.ledger.harvest_lock_state().await.unwrap_or_default();
            return Err(KeeperError::LockContention {
                holder: state.holder.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let result = self.harvest_locked().await;

        if let Err(release_err) = self.ledger.release_harvest_lock(holder).await {
            // The lock has no timeout; a stuck lock needs operator action.
            error!("Failed to release harvest lock: {}", release_err);
        }

        result
    }

    async fn harvest_locked(&self) -> KeeperResult<HarvestOutcome> {
        // Re-check under the lock; the threshold may have been consumed
        // between the outer check and acquisition.
        let snapshot = self.query_withheld().await?;
        let vault_balance = self.ledger.vault_balance(&self.token_mint).await?;
        if snapshot.total_withheld + vault_balance < self.config.threshold {
            return Err(KeeperError::ThresholdNotMet {
                current: snapshot.total_withheld + vault_balance,
                threshold: self.config.threshold,
            });
        }

        let mut outcome = HarvestOutcome::default();
        let addresses: Vec<_> = snapshot.accounts.iter().map(|a| a.address).collect();

        for (index, batch) in addresses.chunks(self.config.batch_size).enumerate() {
            match self.ledger.harvest_batch(batch).await {
                Ok(receipt) => {
                    let batch_total: u64 = snapshot
                        .accounts
                        .iter()
                        .filter(|a| batch.contains(&a.address))
                        .map(|a| a.withheld_amount)
                        .sum();
                    outcome.total_harvested += batch_total;
                    outcome.accounts_processed += batch.len();
                    outcome.batches_confirmed += 1;
                    outcome.signatures.push(receipt.signature);
                    info!(
                        "Harvested batch {} ({} accounts, {} units)",
                        index + 1,
                        batch.len(),
                        batch_total
                    );
                }
                Err(err) => {
                    // Confirmed batches stand; no harvest rollback exists.
                    let remaining = addresses.len().div_ceil(self.config.batch_size) - index;
                    outcome.batches_aborted = remaining;
                    warn!(
                        "Harvest batch {} failed, aborting {} remaining batches: {}",
                        index + 1,
                        remaining,
                        err
                    );
                    break;
                }
            }
        }

        if outcome.batches_confirmed > 0 || vault_balance > 0 {
            match self.ledger.withdraw_from_mint().await {
                Ok(receipt) => outcome.signatures.push(receipt.signature),
                Err(err) => warn!("Withdraw from mint failed: {}", err),
            }
        }

        info!(
            "Harvest complete: {} units from {} accounts ({} batches confirmed, {} aborted)",
            outcome.total_harvested,
            outcome.accounts_processed,
            outcome.batches_confirmed,
            outcome.batches_aborted
        );
        Ok(outcome)
    }
}
