//! Scenario-based swap planning and execution
//!
//! A harvested amount is allocated across owner, holders and an optional
//! keeper top-up, then converted through the swap router. Four scenarios
//! cross (reward == SOL) with (keeper balance below minimum). The top-up is
//! carved out of the owner share only and its bound is computed from a real
//! quote obtained before the plan is finalized, never from an estimated
//! rate. Split math is integer basis points; owner shares floor so no unit
//! is ever minted.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::{error, info, warn};

use crate::config::{DistributionConfig, KeeperBalanceConfig, SwapConfig};
use crate::core::error::{KeeperError, KeeperResult};
use crate::core::retry::{retry_read, RetryPolicy};
use crate::core::traits::SwapRouter;
use crate::core::types::*;

pub struct SwapPlanner {
    router: Arc<dyn SwapRouter>,
    swap_config: SwapConfig,
    keeper_config: KeeperBalanceConfig,
    token_mint: Pubkey,
    owner_share_bps: u16,
    retry: RetryPolicy,
}

/// Floored owner/holder split; the holder side absorbs the division dust so
/// the two always sum to the input exactly.
pub fn split_by_bps(amount: u64, owner_share_bps: u16) -> (u64, u64) {
    let owner = (amount as u128 * owner_share_bps as u128 / BPS_DENOMINATOR as u128) as u64;
    (owner, amount - owner)
}

/// Input-denominated top-up carved from the owner share: the slice of the
/// owner's input whose quoted proceeds cover the keeper deficit, capped at
/// the whole share.
pub fn carve_top_up(owner_share: u64, quoted_out: u64, deficit_lamports: u64) -> u64 {
    if owner_share == 0 || quoted_out == 0 || deficit_lamports == 0 {
        return 0;
    }
    if quoted_out <= deficit_lamports {
        return owner_share;
    }
    ((owner_share as u128 * deficit_lamports as u128) / quoted_out as u128) as u64
}

impl SwapPlanner {
    pub fn new(
        router: Arc<dyn SwapRouter>,
        swap_config: SwapConfig,
        keeper_config: KeeperBalanceConfig,
        distribution_config: &DistributionConfig,
        token_mint: Pubkey,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            router,
            swap_config,
            keeper_config,
            token_mint,
            owner_share_bps: distribution_config.owner_share_bps,
            retry,
        }
    }

    fn keeper_deficit(&self, keeper_balance: u64) -> u64 {
        self.keeper_config
            .target_lamports
            .saturating_sub(keeper_balance)
    }

    /// Build the allocation plan for one cycle. A keeper balance exactly at
    /// the minimum is normal, not low.
    pub async fn create_plan(
        &self,
        amount: u64,
        reward_mint: Pubkey,
        keeper_balance: u64,
    ) -> KeeperResult<SwapPlan> {
        if amount == 0 {
            return Err(KeeperError::Validation(
                "cannot plan a swap for a zero amount".to_string(),
            ));
        }

        let is_sol_reward = reward_mint == SOL_MINT;
        let low_keeper = keeper_balance < self.keeper_config.min_lamports;
        let (owner_share, holders_share) = split_by_bps(amount, self.owner_share_bps);

        let (scenario, splits, legs) = match (is_sol_reward, low_keeper) {
            (true, false) => (
                Scenario::SolRewardNormal,
                TaxSplits {
                    owner_amount: owner_share,
                    holders_amount: holders_share,
                    keeper_top_up: 0,
                },
                vec![SwapLeg {
                    from_mint: self.token_mint,
                    to_mint: SOL_MINT,
                    amount,
                    purpose: LegPurpose::HolderRewards,
                }],
            ),
            (true, true) => {
                // Quote the whole amount once; the owner slice of the quoted
                // proceeds bounds the top-up.
                let quote = retry_read(&self.retry, "top-up quote", || {
                    self.router.get_quote(
                        &self.token_mint,
                        &SOL_MINT,
                        amount,
                        self.swap_config.slippage_bps,
                    )
                })
                .await?;
                let (owner_out, _) = split_by_bps(quote.out_amount, self.owner_share_bps);
                let deficit = self.keeper_deficit(keeper_balance);
                let top_up = carve_top_up(owner_share, owner_out, deficit);
                (
                    Scenario::SolRewardLowKeeper,
                    TaxSplits {
                        owner_amount: owner_share - top_up,
                        holders_amount: holders_share,
                        keeper_top_up: top_up,
                    },
                    vec![SwapLeg {
                        from_mint: self.token_mint,
                        to_mint: SOL_MINT,
                        amount,
                        purpose: LegPurpose::HolderRewards,
                    }],
                )
            }
            (false, false) => (
                Scenario::TokenRewardNormal,
                TaxSplits {
                    owner_amount: owner_share,
                    holders_amount: holders_share,
                    keeper_top_up: 0,
                },
                vec![SwapLeg {
                    from_mint: self.token_mint,
                    to_mint: reward_mint,
                    amount,
                    purpose: LegPurpose::HolderRewards,
                }],
            ),
            (false, true) => {
                // The owner share converts to SOL for the keeper/owner; the
                // holder share converts to the reward asset.
                let quote = retry_read(&self.retry, "top-up quote", || {
                    self.router.get_quote(
                        &self.token_mint,
                        &SOL_MINT,
                        owner_share,
                        self.swap_config.slippage_bps,
                    )
                })
                .await?;
                let deficit = self.keeper_deficit(keeper_balance);
                let top_up = carve_top_up(owner_share, quote.out_amount, deficit);
                (
                    Scenario::TokenRewardLowKeeper,
                    TaxSplits {
                        owner_amount: owner_share - top_up,
                        holders_amount: holders_share,
                        keeper_top_up: top_up,
                    },
                    vec![
                        SwapLeg {
                            from_mint: self.token_mint,
                            to_mint: SOL_MINT,
                            amount: owner_share,
                            purpose: LegPurpose::KeeperTopUp,
                        },
                        SwapLeg {
                            from_mint: self.token_mint,
                            to_mint: reward_mint,
                            amount: holders_share,
                            purpose: LegPurpose::HolderRewards,
                        },
                    ],
                )
            }
        };

        let plan = SwapPlan {
            scenario,
            input_amount: amount,
            reward_mint,
            keeper_balance,
            splits,
            legs,
        };
        self.check_plan(&plan)?;

        info!(
            "Swap plan {:?}: input={} owner={} holders={} top_up={}",
            plan.scenario,
            plan.input_amount,
            plan.splits.owner_amount,
            plan.splits.holders_amount,
            plan.splits.keeper_top_up
        );
        Ok(plan)
    }

    /// Split conservation and top-up bounds must hold for every plan; a
    /// violation is a defect, not something to correct silently.
    fn check_plan(&self, plan: &SwapPlan) -> KeeperResult<()> {
        if plan.splits.total() != plan.input_amount {
            return Err(KeeperError::InvariantViolation(format!(
                "splits {} do not sum to input {}",
                plan.splits.total(),
                plan.input_amount
            )));
        }
        if plan.splits.keeper_top_up > plan.splits.owner_share() {
            return Err(KeeperError::InvariantViolation(
                "keeper top-up exceeds the owner share".to_string(),
            ));
        }
        let legs_total: u64 = plan.legs.iter().map(|leg| leg.amount).sum();
        if legs_total != plan.input_amount {
            return Err(KeeperError::InvariantViolation(format!(
                "swap legs {} do not cover input {}",
                legs_total, plan.input_amount
            )));
        }
        Ok(())
    }

    /// Execute the planned legs. All legs are quoted first and any quote
    /// over the price-impact ceiling aborts the plan before anything
    /// executes. After the first execution failure no further legs run and
    /// nothing is forwarded to distribution.
    pub async fn execute_plan(&self, plan: &SwapPlan) -> KeeperResult<SwapExecutionResult> {
        let mut quotes = Vec::with_capacity(plan.legs.len());
        for leg in &plan.legs {
            let quote = retry_read(&self.retry, "leg quote", || {
                self.router.get_quote(
                    &leg.from_mint,
                    &leg.to_mint,
                    leg.amount,
                    self.swap_config.slippage_bps,
                )
            })
            .await?;

            if quote.price_impact_bps > self.swap_config.max_price_impact_bps {
                error!(
                    "Price impact {} bps exceeds ceiling {} bps for {} -> {}, aborting plan",
                    quote.price_impact_bps,
                    self.swap_config.max_price_impact_bps,
                    leg.from_mint,
                    leg.to_mint
                );
                return Ok(SwapExecutionResult {
                    success: false,
                    legs_executed: Vec::new(),
                    legs_failed: vec![FailedLeg {
                        leg: leg.clone(),
                        error: KeeperError::PriceImpactExceeded {
                            from: leg.from_mint.to_string(),
                            to: leg.to_mint.to_string(),
                            impact_bps: quote.price_impact_bps,
                            ceiling_bps: self.swap_config.max_price_impact_bps,
                        }
                        .to_string(),
                    }],
                    rollback_required: false,
                    final_splits: None,
                });
            }
            quotes.push(quote);
        }

        let mut legs_executed = Vec::new();
        let mut legs_failed = Vec::new();

        for (leg, quote) in plan.legs.iter().zip(quotes.iter()) {
            match self.router.execute_swap(quote).await {
                Ok(receipt) => {
                    info!(
                        "Leg executed: {} {} -> {} {} ({})",
                        receipt.in_amount,
                        leg.from_mint,
                        receipt.out_amount,
                        leg.to_mint,
                        receipt.signature
                    );
                    legs_executed.push(LegReceipt {
                        leg: leg.clone(),
                        signature: receipt.signature,
                        in_amount: receipt.in_amount,
                        out_amount: receipt.out_amount,
                    });
                }
                Err(err) => {
                    warn!("Swap leg failed, stopping plan execution: {}", err);
                    legs_failed.push(FailedLeg {
                        leg: leg.clone(),
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }

        if !legs_failed.is_empty() {
            return Ok(SwapExecutionResult {
                success: false,
                rollback_required: !legs_executed.is_empty(),
                legs_executed,
                legs_failed,
                final_splits: None,
            });
        }

        let final_splits = self.finalize_splits(plan, &legs_executed)?;
        Ok(SwapExecutionResult {
            success: true,
            legs_executed,
            legs_failed,
            rollback_required: false,
            final_splits: Some(final_splits),
        })
    }

    /// Convert input-denominated splits into the executed outputs. The
    /// keeper deficit is re-bounded against the actual proceeds.
    fn finalize_splits(
        &self,
        plan: &SwapPlan,
        receipts: &[LegReceipt],
    ) -> KeeperResult<FinalSplits> {
        let deficit = self.keeper_deficit(plan.keeper_balance);

        match plan.scenario {
            Scenario::SolRewardNormal | Scenario::SolRewardLowKeeper => {
                let receipt = receipts.first().ok_or_else(|| {
                    KeeperError::InvariantViolation("no receipt for executed plan".to_string())
                })?;
                let (owner_out, holders_out) =
                    split_by_bps(receipt.out_amount, self.owner_share_bps);
                let top_up = if plan.scenario == Scenario::SolRewardLowKeeper {
                    deficit.min(owner_out)
                } else {
                    0
                };
                Ok(FinalSplits {
                    owner_amount: owner_out - top_up,
                    owner_mint: SOL_MINT,
                    holders_amount: holders_out,
                    holders_mint: SOL_MINT,
                    keeper_top_up: top_up,
                })
            }
            Scenario::TokenRewardNormal => {
                let receipt = receipts.first().ok_or_else(|| {
                    KeeperError::InvariantViolation("no receipt for executed plan".to_string())
                })?;
                let (owner_out, holders_out) =
                    split_by_bps(receipt.out_amount, self.owner_share_bps);
                Ok(FinalSplits {
                    owner_amount: owner_out,
                    owner_mint: plan.reward_mint,
                    holders_amount: holders_out,
                    holders_mint: plan.reward_mint,
                    keeper_top_up: 0,
                })
            }
            Scenario::TokenRewardLowKeeper => {
                let top_up_leg = receipts
                    .iter()
                    .find(|r| r.leg.purpose == LegPurpose::KeeperTopUp);
                let holders_leg = receipts
                    .iter()
                    .find(|r| r.leg.purpose == LegPurpose::HolderRewards)
                    .ok_or_else(|| {
                        KeeperError::InvariantViolation(
                            "missing holder-rewards receipt".to_string(),
                        )
                    })?;
                let owner_sol = top_up_leg.map(|r| r.out_amount).unwrap_or(0);
                let top_up = deficit.min(owner_sol);
                Ok(FinalSplits {
                    owner_amount: owner_sol - top_up,
                    owner_mint: SOL_MINT,
                    holders_amount: holders_leg.out_amount,
                    holders_mint: plan.reward_mint,
                    keeper_top_up: top_up,
                })
            }
        }
    }

    /// Best-effort reversal of already-executed legs, in reverse order and
    /// at the wider rollback slippage. Individual failures are logged and
    /// skipped; a realized loss is accepted over stranding principal in an
    /// intermediate asset.
    pub async fn rollback_swaps(&self, executed: &[LegReceipt]) -> bool {
        warn!("Attempting rollback of {} executed legs", executed.len());
        let mut all_reversed = true;

        for receipt in executed.iter().rev() {
            let reverse = async {
                let quote = self
                    .router
                    .get_quote(
                        &receipt.leg.to_mint,
                        &receipt.leg.from_mint,
                        receipt.out_amount,
                        self.swap_config.rollback_slippage_bps,
                    )
                    .await?;
                self.router.execute_swap(&quote).await
            };

            match reverse.await {
                Ok(reversal) => {
                    info!(
                        "Rolled back leg {} ({} recovered)",
                        receipt.signature, reversal.out_amount
                    );
                }
                Err(err) => {
                    error!("Failed to roll back leg {}: {}", receipt.signature, err);
                    all_reversed = false;
                }
            }
        }
        all_reversed
    }
}
