//! Top-level cycle driver
//!
//! Wires the lifecycle manager, harvest coordinator, swap planner and
//! distribution engine into the periodic harvest cycle, plus the two
//! independent cadences (fee-rate checks, reward re-selection). Every stage
//! failure abandons the current cycle; the next tick re-evaluates from the
//! harvest threshold. Nothing here panics the process.

use std::sync::Arc;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::KeeperConfig;
use crate::core::error::{KeeperError, KeeperResult};
use crate::core::traits::LedgerClient;
use crate::core::types::*;

use super::distribution::DistributionEngine;
use super::fee_lifecycle::FeeLifecycleManager;
use super::harvest::HarvestCoordinator;
use super::swap_planner::SwapPlanner;
use super::token_select::TokenSelector;

/// Read-only view served by the status endpoint
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusReport {
    pub fee_schedule: FeeSchedule,
    pub harvest_lock: HarvestLockState,
    pub undistributed_amount: u64,
    pub undistributed_mint: Option<String>,
    pub reward_mint: String,
    pub last_cycle: Option<CycleReport>,
}

pub struct Orchestrator {
    ledger: Arc<dyn LedgerClient>,
    fee_lifecycle: Mutex<FeeLifecycleManager>,
    harvest: HarvestCoordinator,
    planner: SwapPlanner,
    distribution: DistributionEngine,
    selector: TokenSelector,
    token_mint: Pubkey,
    owner_wallet: Pubkey,
    keeper_wallet: Pubkey,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl Orchestrator {
    pub fn new(
        config: &KeeperConfig,
        ledger: Arc<dyn LedgerClient>,
        fee_lifecycle: FeeLifecycleManager,
        harvest: HarvestCoordinator,
        planner: SwapPlanner,
        distribution: DistributionEngine,
        selector: TokenSelector,
    ) -> Self {
        Self {
            ledger,
            fee_lifecycle: Mutex::new(fee_lifecycle),
            harvest,
            planner,
            distribution,
            selector,
            token_mint: config.token.mint,
            owner_wallet: config.token.owner_wallet,
            keeper_wallet: config.token.keeper_wallet,
            last_cycle: Mutex::new(None),
        }
    }

    pub fn distribution(&self) -> &DistributionEngine {
        &self.distribution
    }

    pub fn selector(&self) -> &TokenSelector {
        &self.selector
    }

    /// Record the launch event (idempotent).
    pub async fn set_launch(&self, timestamp: i64) {
        self.fee_lifecycle.lock().await.set_launch(timestamp);
    }

    /// Fee-rate cadence entry point: apply a due transition on-chain.
    pub async fn check_fee_rate(&self) -> KeeperResult<Option<FeeTransition>> {
        let transition = {
            let mut lifecycle = self.fee_lifecycle.lock().await;
            lifecycle.check_and_transition(Utc::now().timestamp())
        };
        let Some(transition) = transition else {
            return Ok(None);
        };

        match self
            .ledger
            .update_fee_rate(transition.rate_bps, transition.revoke_authority)
            .await
        {
            Ok(receipt) => {
                info!(
                    "Fee rate updated to {} bps (revoke={}): {}",
                    transition.rate_bps, transition.revoke_authority, receipt.signature
                );
                Ok(Some(transition))
            }
            Err(err) => {
                // The transition was issued exactly once; a failed write is
                // an operator alert, not a re-issue.
                error!(
                    "Fee update to {} bps failed after issuance: {}",
                    transition.rate_bps, err
                );
                Err(err)
            }
        }
    }

    /// Reward-asset cadence entry point, gated to once a week.
    pub async fn check_reward_token(&self) -> KeeperResult<Option<Pubkey>> {
        let now = Utc::now().timestamp();
        if !self.selector.is_due(now) {
            debug!("Reward re-selection not due yet");
            return Ok(None);
        }
        self.selector.check_and_select(now).await
    }

    /// Operator trigger: attempt to distribute the carried undistributed
    /// balance outside the normal cycle, e.g. after holders appeared.
    pub async fn run_distribution(&self) -> KeeperResult<DistributionResult> {
        let undistributed = self.distribution.undistributed();
        let mint = undistributed
            .mint
            .filter(|_| undistributed.amount > 0)
            .ok_or_else(|| {
                KeeperError::Validation("no undistributed balance to distribute".to_string())
            })?;

        let plan = self.distribution.create_distribution_plan(0, mint).await?;
        let result = self.distribution.execute_distribution(&plan).await?;
        self.distribution.reconcile_undistributed(&plan, &result);
        Ok(result)
    }

    /// Refresh and report the eligible holder count (operator trigger).
    pub async fn refresh_holders(&self) -> KeeperResult<usize> {
        let count = self.distribution.eligible_holder_count().await?;
        info!("Holder registry refreshed: {} eligible holders", count);
        Ok(count)
    }

    /// The composite harvest cycle. Stage failures abandon the cycle;
    /// value that failed to move stays discoverable (vault balance or
    /// undistributed carry-forward) for the next invocation.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now().timestamp();
        let report = match self.run_cycle_inner(started_at).await {
            Ok(report) => report,
            Err(err) if err.is_benign() => {
                debug!("Cycle skipped: {}", err);
                CycleReport::skipped(err.to_string(), started_at)
            }
            Err(err) => {
                error!("Cycle aborted: {}", err);
                CycleReport {
                    outcome: CycleOutcome::Aborted(err.to_string()),
                    harvested: 0,
                    swapped_out: 0,
                    distributed: 0,
                    recipients: 0,
                    undistributed: self.distribution.undistributed().amount,
                    started_at,
                    finished_at: Utc::now().timestamp(),
                }
            }
        };
        *self.last_cycle.lock().await = Some(report.clone());
        report
    }

    async fn run_cycle_inner(&self, started_at: i64) -> KeeperResult<CycleReport> {
        if !self.harvest.should_harvest().await? {
            return Ok(CycleReport::skipped("threshold not met", started_at));
        }

        // Harvest. Partial harvests are valid; the cycle works with
        // whatever landed in the vault.
        let harvest_outcome = self.harvest.harvest().await?;
        let input_amount = self.ledger.vault_balance(&self.token_mint).await?;
        if input_amount == 0 {
            return Ok(CycleReport::skipped("nothing in vault after harvest", started_at));
        }
        info!(
            "Cycle input: {} in vault ({} newly harvested)",
            input_amount, harvest_outcome.total_harvested
        );

        let reward_mint = self.selector.current_reward_mint();
        let keeper_balance = self.ledger.keeper_balance().await?;

        // Plan and execute the conversion
        let plan = self
            .planner
            .create_plan(input_amount, reward_mint, keeper_balance)
            .await?;
        let execution = self.planner.execute_plan(&plan).await?;

        if !execution.success {
            if execution.rollback_required {
                warn!(
                    "Swap execution failed after {} legs; rolling back",
                    execution.legs_executed.len()
                );
                self.planner.rollback_swaps(&execution.legs_executed).await;
            }
            // Value remains in the vault (input asset); the next cycle's
            // threshold check re-discovers it.
            return Ok(CycleReport {
                outcome: CycleOutcome::Aborted("swap execution failed".to_string()),
                harvested: harvest_outcome.total_harvested,
                swapped_out: 0,
                distributed: 0,
                recipients: 0,
                undistributed: self.distribution.undistributed().amount,
                started_at,
                finished_at: Utc::now().timestamp(),
            });
        }

        let splits = execution.final_splits.as_ref().ok_or_else(|| {
            KeeperError::InvariantViolation("successful execution without final splits".to_string())
        })?;

        // Owner payout and keeper top-up come out of the owner share only.
        // Failures here alert but do not block holder distribution.
        if splits.keeper_top_up > 0 {
            match self
                .ledger
                .transfer(&SOL_MINT, &self.keeper_wallet, splits.keeper_top_up)
                .await
            {
                Ok(receipt) => info!(
                    "Keeper topped up with {} lamports ({})",
                    splits.keeper_top_up, receipt.signature
                ),
                Err(err) => error!("Keeper top-up transfer failed: {}", err),
            }
        }
        if splits.owner_amount > 0 {
            match self
                .ledger
                .transfer(&splits.owner_mint, &self.owner_wallet, splits.owner_amount)
                .await
            {
                Ok(receipt) => info!(
                    "Owner share {} of {} paid ({})",
                    splits.owner_amount, splits.owner_mint, receipt.signature
                ),
                Err(err) => error!("Owner share transfer failed: {}", err),
            }
        }

        // Distribute the holder share and reconcile any shortfall into the
        // undistributed balance.
        let distribution_plan = self
            .distribution
            .create_distribution_plan(splits.holders_amount, splits.holders_mint)
            .await?;
        let distribution_result = self.distribution.execute_distribution(&distribution_plan).await?;
        self.distribution
            .reconcile_undistributed(&distribution_plan, &distribution_result);

        let swapped_out: u64 = execution.legs_executed.iter().map(|r| r.out_amount).sum();
        info!(
            "Cycle complete: harvested={} swapped_out={} distributed={} recipients={} undistributed={}",
            harvest_outcome.total_harvested,
            swapped_out,
            distribution_result.distributed,
            distribution_result.recipients,
            distribution_result.undistributed_amount
        );

        Ok(CycleReport {
            outcome: CycleOutcome::Completed,
            harvested: harvest_outcome.total_harvested,
            swapped_out,
            distributed: distribution_result.distributed,
            recipients: distribution_result.recipients,
            undistributed: distribution_result.undistributed_amount,
            started_at,
            finished_at: Utc::now().timestamp(),
        })
    }

    /// Read-only status for the operator API
    pub async fn status(&self) -> KeeperResult<StatusReport> {
        let fee_schedule = {
            let lifecycle = self.fee_lifecycle.lock().await;
            lifecycle.schedule(Utc::now().timestamp())
        };
        let harvest_lock = self.ledger.harvest_lock_state().await?;
        let undistributed = self.distribution.undistributed();
        let last_cycle = self.last_cycle.lock().await.clone();

        Ok(StatusReport {
            fee_schedule,
            harvest_lock,
            undistributed_amount: undistributed.amount,
            undistributed_mint: undistributed.mint.map(|m| m.to_string()),
            reward_mint: self.selector.current_reward_mint().to_string(),
            last_cycle,
        })
    }
}
