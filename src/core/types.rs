//! Core domain types for the tax-flow orchestration engine

use chrono::Utc;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Native SOL mint, the base asset every scenario is crossed against
pub const SOL_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

/// Basis-point denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Derived fee schedule state, never stored on its own
#[derive(Debug, Clone, Serialize)]
pub struct FeeSchedule {
    pub launch_timestamp: Option<i64>,
    pub current_rate_bps: u16,
    pub finalized: bool,
}

/// A fee-rate transition due at the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeTransition {
    pub rate_bps: u16,
    /// True exactly at the final breakpoint; issued at most once
    pub revoke_authority: bool,
}

/// Point-in-time view of withheld fees across token accounts.
/// Recomputed on every check, never persisted.
#[derive(Debug, Clone, Default)]
pub struct WithheldFeesSnapshot {
    pub total_withheld: u64,
    pub accounts: Vec<WithheldAccount>,
}

#[derive(Debug, Clone)]
pub struct WithheldAccount {
    pub address: Pubkey,
    pub withheld_amount: u64,
}

/// Externally observable harvest lock state
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestLockState {
    pub held: bool,
    pub holder: Option<String>,
}

/// Receipt for a single confirmed transaction
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub signature: String,
    pub slot: u64,
}

/// Result of a completed (possibly partial) harvest
#[derive(Debug, Clone, Default)]
pub struct HarvestOutcome {
    pub total_harvested: u64,
    pub accounts_processed: usize,
    pub batches_confirmed: usize,
    pub batches_aborted: usize,
    pub signatures: Vec<String>,
}

/// Tax-flow scenario, crossing reward asset against keeper liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scenario {
    SolRewardLowKeeper,
    SolRewardNormal,
    TokenRewardLowKeeper,
    TokenRewardNormal,
}

impl Scenario {
    pub fn is_low_keeper(&self) -> bool {
        matches!(self, Scenario::SolRewardLowKeeper | Scenario::TokenRewardLowKeeper)
    }
}

/// What a swap leg's proceeds are for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LegPurpose {
    KeeperTopUp,
    OwnerPayment,
    HolderRewards,
}

/// One planned conversion against the swap router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLeg {
    pub from_mint: Pubkey,
    pub to_mint: Pubkey,
    pub amount: u64,
    pub purpose: LegPurpose,
}

/// Input-denominated allocation of a harvested amount.
/// Invariant: `owner_amount + holders_amount + keeper_top_up == input_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxSplits {
    pub owner_amount: u64,
    pub holders_amount: u64,
    pub keeper_top_up: u64,
}

impl TaxSplits {
    pub fn total(&self) -> u64 {
        self.owner_amount + self.holders_amount + self.keeper_top_up
    }

    /// The owner share the top-up was carved from
    pub fn owner_share(&self) -> u64 {
        self.owner_amount + self.keeper_top_up
    }
}

/// Deterministic allocation plan for one harvest cycle
#[derive(Debug, Clone)]
pub struct SwapPlan {
    pub scenario: Scenario,
    pub input_amount: u64,
    pub reward_mint: Pubkey,
    pub keeper_balance: u64,
    pub splits: TaxSplits,
    pub legs: Vec<SwapLeg>,
}

/// A quote returned by the swap router before execution
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub from_mint: Pubkey,
    pub to_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_bps: u32,
    pub slippage_bps: u16,
    /// Opaque route payload handed back to the router on execution
    pub route: serde_json::Value,
}

/// Receipt for one executed swap leg, kept for potential rollback
#[derive(Debug, Clone)]
pub struct LegReceipt {
    pub leg: SwapLeg,
    pub signature: String,
    pub in_amount: u64,
    pub out_amount: u64,
}

#[derive(Debug, Clone)]
pub struct FailedLeg {
    pub leg: SwapLeg,
    pub error: String,
}

/// Executed-output-denominated allocation, derived from actual receipts
#[derive(Debug, Clone)]
pub struct FinalSplits {
    pub owner_amount: u64,
    pub owner_mint: Pubkey,
    pub holders_amount: u64,
    pub holders_mint: Pubkey,
    /// Keeper top-up in lamports, already bounded by the real quote
    pub keeper_top_up: u64,
}

/// Outcome of executing a swap plan.
/// If any leg failed, nothing is forwarded to distribution.
#[derive(Debug, Clone)]
pub struct SwapExecutionResult {
    pub success: bool,
    pub legs_executed: Vec<LegReceipt>,
    pub legs_failed: Vec<FailedLeg>,
    pub rollback_required: bool,
    pub final_splits: Option<FinalSplits>,
}

/// A token holder as reported by the market data source
#[derive(Debug, Clone)]
pub struct TokenHolder {
    pub address: Pubkey,
    pub balance: u64,
}

/// One eligible holder's slice of a distribution
#[derive(Debug, Clone)]
pub struct HolderShare {
    pub address: Pubkey,
    pub balance: u64,
    pub share_bps: u32,
    pub reward_amount: u64,
}

/// Pro-rata distribution plan for one cycle
#[derive(Debug, Clone)]
pub struct DistributionPlan {
    pub total_amount: u64,
    pub reward_mint: Pubkey,
    pub eligible_holders: Vec<HolderShare>,
    pub excluded_count: usize,
    pub undistributed_carried_in: u64,
}

#[derive(Debug, Clone)]
pub struct FailedTransfer {
    pub address: Pubkey,
    pub amount: u64,
    pub error: String,
}

/// Outcome of executing a distribution plan. An empty holder set is a
/// deferral, reported as success with zero distributed.
#[derive(Debug, Clone, Default)]
pub struct DistributionResult {
    pub success: bool,
    pub distributed: u64,
    pub recipients: usize,
    pub signatures: Vec<String>,
    pub failed: Vec<FailedTransfer>,
    pub undistributed_amount: u64,
}

/// Value that could not be distributed in a cycle, carried into the next one.
/// Mutated only by the distribution engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndistributedBalance {
    pub amount: u64,
    #[serde(with = "super::opt_pubkey_serde")]
    pub mint: Option<Pubkey>,
    pub last_updated: i64,
}

impl UndistributedBalance {
    pub fn record(amount: u64, mint: Pubkey) -> Self {
        Self {
            amount,
            mint: Some(mint),
            last_updated: Utc::now().timestamp(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

/// A reward-asset candidate returned by symbol search
#[derive(Debug, Clone)]
pub struct CandidateAsset {
    pub mint: Pubkey,
    pub symbol: String,
    pub volume_24h_usd: f64,
    pub liquidity_usd: f64,
}

/// A post fetched from the social source, used only for symbol extraction
#[derive(Debug, Clone)]
pub struct SocialPost {
    pub id: String,
    pub text: String,
}

/// How a harvest cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    /// Threshold not met or lock contention; nothing to do
    Skipped(String),
    /// All stages completed (distribution may still have deferred)
    Completed,
    /// A stage failed and the cycle was abandoned
    Aborted(String),
}

/// Statistics for the most recent harvest cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub harvested: u64,
    pub swapped_out: u64,
    pub distributed: u64,
    pub recipients: usize,
    pub undistributed: u64,
    pub started_at: i64,
    pub finished_at: i64,
}

impl CycleReport {
    pub fn skipped(reason: impl Into<String>, started_at: i64) -> Self {
        Self {
            outcome: CycleOutcome::Skipped(reason.into()),
            harvested: 0,
            swapped_out: 0,
            distributed: 0,
            recipients: 0,
            undistributed: 0,
            started_at,
            finished_at: Utc::now().timestamp(),
        }
    }
}
