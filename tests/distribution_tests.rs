//! Distribution planning, rollover and batch execution

mod common;

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tempfile::TempDir;

use surge_keeper::adapters::ledger::SimLedger;
use surge_keeper::adapters::market::SimMarketData;
use surge_keeper::config::DistributionConfig;
use surge_keeper::core::types::TokenHolder;
use surge_keeper::services::DistributionEngine;

struct Setup {
    ledger: Arc<SimLedger>,
    market: Arc<SimMarketData>,
    engine: DistributionEngine,
    token_mint: Pubkey,
    _state_dir: TempDir,
}

fn setup() -> Setup {
    setup_with(|_| {})
}

fn setup_with(tweak: impl FnOnce(&mut DistributionConfig)) -> Setup {
    let state_dir = TempDir::new().unwrap();
    let token_mint = Pubkey::new_unique();
    let ledger = Arc::new(SimLedger::new(token_mint, 3000));
    let market = Arc::new(SimMarketData::new());
    market.set_price(token_mint, 1.0);

    let mut config = DistributionConfig {
        state_path: state_dir.path().join("undistributed.json"),
        batch_size: 2,
        ..Default::default()
    };
    tweak(&mut config);

    let engine = DistributionEngine::new(
        ledger.clone(),
        market.clone(),
        config,
        token_mint,
        9,
        &[],
        common::fast_retry(),
    );
    Setup {
        ledger,
        market,
        engine,
        token_mint,
        _state_dir: state_dir,
    }
}

/// Balance worth `usd` dollars at the 1 USD token price used in setup
fn balance_for_usd(usd: u64) -> u64 {
    usd * 1_000_000_000
}

#[tokio::test]
async fn test_zero_eligible_holders_defers_whole_amount() {
    let s = setup();
    let reward = Pubkey::new_unique();

    let plan = s.engine.create_distribution_plan(1000, reward).await.unwrap();
    assert!(plan.eligible_holders.is_empty());
    assert_eq!(plan.total_amount, 1000);

    let result = s.engine.execute_distribution(&plan).await.unwrap();
    assert!(result.success, "deferral is success, not failure");
    assert_eq!(result.distributed, 0);
    assert_eq!(result.undistributed_amount, 1000);

    let undistributed = s.engine.undistributed();
    assert_eq!(undistributed.amount, 1000);
    assert_eq!(undistributed.mint, Some(reward));
}

#[tokio::test]
async fn test_rollover_folds_into_next_cycle() {
    let s = setup();
    let reward = Pubkey::new_unique();

    // Cycle 1: nobody eligible, everything deferred
    let plan1 = s.engine.create_distribution_plan(1000, reward).await.unwrap();
    let result1 = s.engine.execute_distribution(&plan1).await.unwrap();
    s.engine.reconcile_undistributed(&plan1, &result1);
    assert_eq!(s.engine.undistributed().amount, 1000);

    // Cycle 2: two equal holders appear; total covers both cycles
    s.market.set_holders(vec![
        TokenHolder {
            address: Pubkey::new_unique(),
            balance: balance_for_usd(200),
        },
        TokenHolder {
            address: Pubkey::new_unique(),
            balance: balance_for_usd(200),
        },
    ]);
    let plan2 = s.engine.create_distribution_plan(1000, reward).await.unwrap();
    assert_eq!(plan2.total_amount, 2000);
    assert_eq!(plan2.undistributed_carried_in, 1000);
    assert_eq!(plan2.eligible_holders.len(), 2);
    assert_eq!(plan2.eligible_holders[0].reward_amount, 1000);
    assert_eq!(plan2.eligible_holders[1].reward_amount, 1000);

    let result2 = s.engine.execute_distribution(&plan2).await.unwrap();
    s.engine.reconcile_undistributed(&plan2, &result2);
    assert_eq!(result2.distributed, 2000);
    assert!(s.engine.undistributed().is_zero());
}

#[tokio::test]
async fn test_mismatched_asset_is_left_untouched() {
    let s = setup();
    let reward_a = Pubkey::new_unique();
    let reward_b = Pubkey::new_unique();

    let plan = s.engine.create_distribution_plan(500, reward_a).await.unwrap();
    let result = s.engine.execute_distribution(&plan).await.unwrap();
    s.engine.reconcile_undistributed(&plan, &result);
    assert_eq!(s.engine.undistributed().mint, Some(reward_a));

    // Next cycle pays a different asset; the old balance must not fold in
    // and must survive the cycle
    s.market.set_holders(vec![TokenHolder {
        address: Pubkey::new_unique(),
        balance: balance_for_usd(500),
    }]);
    let plan_b = s.engine.create_distribution_plan(300, reward_b).await.unwrap();
    assert_eq!(plan_b.total_amount, 300);
    assert_eq!(plan_b.undistributed_carried_in, 0);

    let result_b = s.engine.execute_distribution(&plan_b).await.unwrap();
    s.engine.reconcile_undistributed(&plan_b, &result_b);
    assert_eq!(result_b.distributed, 300);

    let undistributed = s.engine.undistributed();
    assert_eq!(undistributed.amount, 500);
    assert_eq!(undistributed.mint, Some(reward_a));
}

#[tokio::test]
async fn test_min_usd_and_exclusions_filter_holders() {
    let s = setup();
    let excluded = Pubkey::new_unique();
    s.engine.add_exclusion(excluded);

    s.market.set_holders(vec![
        TokenHolder {
            address: excluded,
            balance: balance_for_usd(10_000),
        },
        TokenHolder {
            address: Pubkey::new_unique(),
            // Below the 100 USD floor
            balance: balance_for_usd(99),
        },
        TokenHolder {
            address: Pubkey::new_unique(),
            balance: balance_for_usd(150),
        },
    ]);

    let plan = s
        .engine
        .create_distribution_plan(1000, Pubkey::new_unique())
        .await
        .unwrap();
    assert_eq!(plan.eligible_holders.len(), 1);
    assert_eq!(plan.excluded_count, 1);
    // The single eligible holder takes the whole amount
    assert_eq!(plan.eligible_holders[0].reward_amount, 1000);
}

#[tokio::test]
async fn test_exclusion_set_add_remove() {
    let s = setup();
    let address = Pubkey::new_unique();

    s.engine.add_exclusion(address);
    assert!(s.engine.exclusions().contains(&address));
    assert!(s.engine.remove_exclusion(address));
    assert!(!s.engine.remove_exclusion(address));
    assert!(!s.engine.exclusions().contains(&address));
}

#[tokio::test]
async fn test_pro_rata_shares_floor_and_order() {
    let s = setup();
    let small = Pubkey::new_unique();
    let large = Pubkey::new_unique();
    s.market.set_holders(vec![
        TokenHolder {
            address: small,
            balance: balance_for_usd(100),
        },
        TokenHolder {
            address: large,
            balance: balance_for_usd(300),
        },
    ]);

    let plan = s
        .engine
        .create_distribution_plan(1000, Pubkey::new_unique())
        .await
        .unwrap();

    // Sorted descending by reward amount
    assert_eq!(plan.eligible_holders[0].address, large);
    assert_eq!(plan.eligible_holders[0].reward_amount, 750);
    assert_eq!(plan.eligible_holders[0].share_bps, 7500);
    assert_eq!(plan.eligible_holders[1].address, small);
    assert_eq!(plan.eligible_holders[1].reward_amount, 250);

    let planned: u64 = plan.eligible_holders.iter().map(|h| h.reward_amount).sum();
    assert!(planned <= plan.total_amount);
}

#[tokio::test]
async fn test_share_rounding_never_exceeds_total() {
    let s = setup();
    // Three equal holders and an amount that does not divide evenly
    s.market.set_holders(
        (0..3)
            .map(|_| TokenHolder {
                address: Pubkey::new_unique(),
                balance: balance_for_usd(100),
            })
            .collect(),
    );

    let plan = s
        .engine
        .create_distribution_plan(1000, Pubkey::new_unique())
        .await
        .unwrap();
    let planned: u64 = plan.eligible_holders.iter().map(|h| h.reward_amount).sum();
    assert_eq!(planned, 999);
    assert!(planned <= plan.total_amount);
}

#[tokio::test]
async fn test_batch_failure_reconciles_shortfall() {
    let s = setup();
    let reward = Pubkey::new_unique();
    // Five holders, batch size 2 -> three batches; the middle one fails
    s.market.set_holders(
        (0..5)
            .map(|_| TokenHolder {
                address: Pubkey::new_unique(),
                balance: balance_for_usd(100),
            })
            .collect(),
    );
    s.ledger.fail_transfer_batches(vec![1]);

    let plan = s.engine.create_distribution_plan(1000, reward).await.unwrap();
    let result = s.engine.execute_distribution(&plan).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed.len(), 2);
    // 5 holders x 200 each; batch of two failed
    assert_eq!(result.distributed, 600);
    assert_eq!(result.recipients, 3);
    assert_eq!(result.undistributed_amount, 400);

    s.engine.reconcile_undistributed(&plan, &result);
    let undistributed = s.engine.undistributed();
    assert_eq!(undistributed.amount, 400);
    assert_eq!(undistributed.mint, Some(reward));
}

#[tokio::test]
async fn test_emergency_withdraw_zeroes_balance() {
    let s = setup();
    let reward = Pubkey::new_unique();
    let destination = Pubkey::new_unique();

    let plan = s.engine.create_distribution_plan(700, reward).await.unwrap();
    let result = s.engine.execute_distribution(&plan).await.unwrap();
    s.engine.reconcile_undistributed(&plan, &result);
    assert_eq!(s.engine.undistributed().amount, 700);

    let receipt = s.engine.emergency_withdraw(destination).await.unwrap();
    assert!(!receipt.signature.is_empty());
    assert!(s.engine.undistributed().is_zero());

    let transfers = s.ledger.recorded_transfers();
    let withdrawal = transfers.last().unwrap();
    assert_eq!(withdrawal.to, destination);
    assert_eq!(withdrawal.amount, 700);
    assert_eq!(withdrawal.mint, reward);

    // Nothing left to withdraw a second time
    assert!(s.engine.emergency_withdraw(destination).await.is_err());
}

#[tokio::test]
async fn test_transfers_reach_recorded_recipients() {
    let s = setup();
    let reward = Pubkey::new_unique();
    let holder = Pubkey::new_unique();
    s.market.set_holders(vec![TokenHolder {
        address: holder,
        balance: balance_for_usd(500),
    }]);

    let plan = s.engine.create_distribution_plan(1234, reward).await.unwrap();
    let result = s.engine.execute_distribution(&plan).await.unwrap();
    assert!(result.success);
    assert_eq!(result.distributed, 1234);

    let transfers = s.ledger.recorded_transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].to, holder);
    assert_eq!(transfers[0].amount, 1234);
}
