//! Shared test harness wiring the simulation adapters into a full
//! orchestrator, the same way `main.rs` does in simulation mode.

#![allow(dead_code)]

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tempfile::TempDir;

use surge_keeper::adapters::ledger::SimLedger;
use surge_keeper::adapters::market::SimMarketData;
use surge_keeper::adapters::social::SimSocialSource;
use surge_keeper::adapters::swap::SimRouter;
use surge_keeper::config::KeeperConfig;
use surge_keeper::core::types::TokenHolder;
use surge_keeper::core::RetryPolicy;
use surge_keeper::services::{
    DistributionEngine, FeeLifecycleManager, HarvestCoordinator, Orchestrator, SwapPlanner,
    TokenSelector,
};

pub struct Harness {
    pub ledger: Arc<SimLedger>,
    pub router: Arc<SimRouter>,
    pub market: Arc<SimMarketData>,
    pub social: Arc<SimSocialSource>,
    pub orchestrator: Orchestrator,
    pub config: KeeperConfig,
    _state_dir: TempDir,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 2.0,
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut KeeperConfig)) -> Harness {
    let state_dir = TempDir::new().expect("temp state dir");

    let mut config = KeeperConfig::default();
    config.token.mint = Pubkey::new_unique();
    config.token.vault_program = Pubkey::new_unique();
    config.token.vault = Pubkey::new_unique();
    config.token.owner_wallet = Pubkey::new_unique();
    config.token.keeper_wallet = Pubkey::new_unique();
    config.harvest.threshold = 500;
    config.distribution.state_path = state_dir.path().join("undistributed.json");
    tweak(&mut config);

    let ledger = Arc::new(SimLedger::new(config.token.mint, config.fees.initial_rate_bps));
    let router = Arc::new(SimRouter::new());
    router.settle_against(ledger.clone());
    let market = Arc::new(SimMarketData::new());
    let social = Arc::new(SimSocialSource::new());
    let retry = fast_retry();

    let fee_lifecycle = FeeLifecycleManager::new(config.fees.clone());
    let harvest = HarvestCoordinator::new(
        ledger.clone(),
        config.harvest.clone(),
        retry,
        config.token.mint,
    );
    let planner = SwapPlanner::new(
        router.clone(),
        config.swap.clone(),
        config.keeper_balance.clone(),
        &config.distribution,
        config.token.mint,
        retry,
    );
    let distribution = DistributionEngine::new(
        ledger.clone(),
        market.clone(),
        config.distribution.clone(),
        config.token.mint,
        config.token.decimals,
        &[
            config.token.vault,
            config.token.vault_program,
            config.token.owner_wallet,
            config.token.keeper_wallet,
        ],
        retry,
    );
    let selector = TokenSelector::new(
        social.clone(),
        market.clone(),
        config.market.clone(),
        retry,
    );

    let orchestrator = Orchestrator::new(
        &config,
        ledger.clone(),
        fee_lifecycle,
        harvest,
        planner,
        distribution,
        selector,
    );

    Harness {
        ledger,
        router,
        market,
        social,
        orchestrator,
        config,
        _state_dir: state_dir,
    }
}

/// Holders whose balances are comfortably above the USD eligibility floor
/// once the token price is set to 1 USD.
pub fn eligible_holders(count: usize, balance: u64) -> Vec<TokenHolder> {
    (0..count)
        .map(|_| TokenHolder {
            address: Pubkey::new_unique(),
            balance,
        })
        .collect()
}
