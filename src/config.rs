//! Configuration management for the Surge keeper
//!
//! Loaded once at process start and passed by reference into each component
//! constructor; no business logic reads configuration through a global.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use validator::Validate;

use crate::core::{pubkey_serde, RetryPolicy};

/// Which adapter variants to wire in at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// In-memory simulation adapters, no network access
    Simulation,
    /// Live RPC / HTTP adapters
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct KeeperConfig {
    pub mode: RunMode,
    #[validate]
    pub network: NetworkConfig,
    #[validate]
    pub token: TokenConfig,
    #[validate]
    pub fees: FeeScheduleConfig,
    #[validate]
    pub harvest: HarvestConfig,
    #[validate]
    pub swap: SwapConfig,
    #[validate]
    pub keeper_balance: KeeperBalanceConfig,
    #[validate]
    pub distribution: DistributionConfig,
    #[validate]
    pub scheduling: SchedulingConfig,
    #[validate]
    pub market: MarketDataConfig,
    #[validate]
    pub social: SocialConfig,
    #[validate]
    pub api: ApiConfig,
    #[validate]
    pub monitoring: MonitoringConfig,
    #[validate]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenConfig {
    /// The fee-on-transfer token this keeper operates
    #[serde(with = "pubkey_serde")]
    pub mint: Pubkey,
    #[validate(range(min = 0, max = 12))]
    pub decimals: u8,
    /// Vault program governing fees, the harvest lock and transfers
    #[serde(with = "pubkey_serde")]
    pub vault_program: Pubkey,
    /// Vault PDA holding harvested fees
    #[serde(with = "pubkey_serde")]
    pub vault: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub owner_wallet: Pubkey,
    #[serde(with = "pubkey_serde")]
    pub keeper_wallet: Pubkey,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeeScheduleConfig {
    /// Rate in force from launch (and before launch, fail-safe-high)
    #[validate(range(min = 0, max = 10000))]
    pub initial_rate_bps: u16,
    #[validate(range(min = 0, max = 10000))]
    pub mid_rate_bps: u16,
    #[validate(range(min = 0, max = 10000))]
    pub final_rate_bps: u16,
    /// Seconds after launch at which the mid rate takes effect
    #[validate(range(min = 1))]
    pub mid_transition_secs: i64,
    /// Seconds after launch at which the final rate takes effect and
    /// update authority is revoked
    #[validate(range(min = 1))]
    pub final_transition_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HarvestConfig {
    /// Threshold in smallest units at which a harvest cycle starts
    #[validate(range(min = 1))]
    pub threshold: u64,
    #[validate(range(min = 1, max = 50))]
    pub batch_size: usize,
    /// Identity written into the harvest lock
    pub lock_holder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SwapConfig {
    pub quote_api_url: String,
    #[validate(range(min = 10, max = 1000))]
    pub slippage_bps: u16,
    /// Wider slippage used only for best-effort rollbacks
    #[validate(range(min = 10, max = 2000))]
    pub rollback_slippage_bps: u16,
    /// Quoted legs above this impact abort the plan
    #[validate(range(min = 1, max = 5000))]
    pub max_price_impact_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KeeperBalanceConfig {
    /// Below this the keeper is topped up out of the owner share
    pub min_lamports: u64,
    /// Top-ups aim for this balance, never past it
    pub target_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DistributionConfig {
    #[validate(range(min = 0, max = 10000))]
    pub owner_share_bps: u16,
    /// Holders below this USD value receive nothing
    pub min_holder_value_usd: f64,
    #[validate(range(min = 1, max = 100))]
    pub batch_size: usize,
    #[validate(range(min = 1, max = 10000))]
    pub max_holders: usize,
    /// Write-through audit file for the undistributed balance
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulingConfig {
    #[validate(range(min = 1, max = 3600))]
    pub fee_check_secs: u64,
    #[validate(range(min = 1, max = 86400))]
    pub harvest_check_secs: u64,
    /// Cadence of the reward-asset re-selection gate check; the gate
    /// itself only opens weekly
    #[validate(range(min = 60, max = 604800))]
    pub reward_check_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarketDataConfig {
    pub api_url: String,
    pub api_key: String,
    /// Candidates under this liquidity are rejected during selection
    pub min_candidate_liquidity_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SocialConfig {
    pub api_url: String,
    /// Account whose pinned post names the reward symbol
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    pub bind_address: String,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub structured_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,
    #[validate(range(min = 100, max = 60000))]
    pub base_delay_ms: u64,
    #[validate(range(min = 100, max = 300000))]
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Simulation
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            mint: Pubkey::default(),
            decimals: 9,
            vault_program: Pubkey::default(),
            vault: Pubkey::default(),
            owner_wallet: Pubkey::default(),
            keeper_wallet: Pubkey::default(),
        }
    }
}

impl Default for FeeScheduleConfig {
    fn default() -> Self {
        Self {
            initial_rate_bps: 3000,
            mid_rate_bps: 1500,
            final_rate_bps: 500,
            mid_transition_secs: 300,
            final_transition_secs: 600,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            threshold: 500_000_000_000, // 500 tokens at 9 decimals
            batch_size: 20,
            lock_holder: "surge-keeper".to_string(),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            quote_api_url: "https://quote-api.jup.ag/v6".to_string(),
            slippage_bps: 100,
            rollback_slippage_bps: 500,
            max_price_impact_bps: 500,
        }
    }
}

impl Default for KeeperBalanceConfig {
    fn default() -> Self {
        Self {
            min_lamports: 50_000_000,     // 0.05 SOL
            target_lamports: 100_000_000, // 0.10 SOL
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            owner_share_bps: 2000,
            min_holder_value_usd: 100.0,
            batch_size: 50,
            max_holders: 1000,
            state_path: "./data/undistributed.json".into(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            fee_check_secs: 60,
            harvest_check_secs: 300,
            reward_check_secs: 3600,
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            api_url: "https://public-api.birdeye.so".to_string(),
            api_key: String::new(),
            min_candidate_liquidity_usd: 50_000.0,
        }
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.twitter.com/2".to_string(),
            account: "surgetoken".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            enable_cors: true,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl KeeperConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Ensure the distribution state directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.distribution.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Validate field ranges and cross-field constraints
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        if self.fees.final_transition_secs <= self.fees.mid_transition_secs {
            anyhow::bail!("final_transition_secs must be after mid_transition_secs");
        }
        if self.fees.mid_rate_bps > self.fees.initial_rate_bps
            || self.fees.final_rate_bps > self.fees.mid_rate_bps
        {
            anyhow::bail!("fee rates must be non-increasing across transitions");
        }
        if self.keeper_balance.target_lamports < self.keeper_balance.min_lamports {
            anyhow::bail!("keeper target balance must be at least the minimum balance");
        }
        if self.swap.rollback_slippage_bps < self.swap.slippage_bps {
            anyhow::bail!("rollback slippage must not be tighter than normal slippage");
        }
        if self.retry.backoff_multiplier <= 1.0 {
            anyhow::bail!("backoff_multiplier must be greater than 1.0");
        }
        if self.mode == RunMode::Live && self.token.mint == Pubkey::default() {
            anyhow::bail!("token.mint must be set in live mode");
        }
        Ok(())
    }
}
