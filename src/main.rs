//! Surge Keeper
//!
//! Off-chain keeper for the Surge token tax flow. Wires the configured
//! adapter variants into the orchestration services, registers the three
//! periodic loops, serves the operator API, and shuts down on ctrl-c.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surge_keeper::adapters::ledger::{LiveLedgerClient, SimLedger};
use surge_keeper::adapters::market::{HttpMarketData, SimMarketData};
use surge_keeper::adapters::social::{HttpSocialSource, SimSocialSource};
use surge_keeper::adapters::swap::{JupiterRouter, SimRouter};
use surge_keeper::config::{KeeperConfig, RunMode};
use surge_keeper::core::traits::{LedgerClient, MarketDataSource, SocialPostSource, SwapRouter};
use surge_keeper::services::{
    DistributionEngine, FeeLifecycleManager, HarvestCoordinator, Orchestrator, SwapPlanner,
    TokenSelector,
};
use surge_keeper::{api, Scheduler};

#[derive(Parser)]
#[command(name = "surge-keeper")]
#[command(about = "Off-chain keeper for the Surge token tax flow")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "keeper.toml")]
    config: String,

    /// Keeper keypair file path (required in live mode)
    #[arg(short, long)]
    keypair: Option<String>,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Launch timestamp override (unix seconds), e.g. when starting after
    /// the pool went live
    #[arg(long)]
    launch_at: Option<i64>,

    /// Validate config and exit
    #[arg(long)]
    dry_run: bool,
}

struct Adapters {
    ledger: Arc<dyn LedgerClient>,
    router: Arc<dyn SwapRouter>,
    market: Arc<dyn MarketDataSource>,
    social: Arc<dyn SocialPostSource>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        KeeperConfig::from_file(&cli.config)?
    } else {
        warn!("Config file not found, using defaults: {}", cli.config);
        KeeperConfig::default()
    };
    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    init_logging(&config)?;

    info!("Starting Surge keeper");
    info!("Mode: {:?}", config.mode);
    info!("Token mint: {}", config.token.mint);
    info!("Harvest threshold: {}", config.harvest.threshold);

    config.check()?;
    config.ensure_directories()?;

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let adapters = build_adapters(&config, cli.keypair.as_deref())?;
    let orchestrator = Arc::new(build_orchestrator(&config, &adapters));

    if let Some(launch_at) = cli.launch_at {
        orchestrator.set_launch(launch_at).await;
    }

    // Three independent cadences: fee-rate checks, harvest cycles, and the
    // weekly reward re-selection gate.
    let scheduler = Scheduler::new();
    {
        let orchestrator = orchestrator.clone();
        scheduler.register(
            "fee-check",
            Duration::from_secs(config.scheduling.fee_check_secs),
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    if let Err(err) = orchestrator.check_fee_rate().await {
                        error!("Fee-rate check failed: {}", err);
                    }
                }
            },
        );
    }
    {
        let orchestrator = orchestrator.clone();
        scheduler.register(
            "harvest-check",
            Duration::from_secs(config.scheduling.harvest_check_secs),
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    // run_cycle never panics or propagates; failed cycles
                    // are reported and the next tick starts fresh.
                    let report = orchestrator.run_cycle().await;
                    info!("Harvest cycle finished: {:?}", report.outcome);
                }
            },
        );
    }
    {
        let orchestrator = orchestrator.clone();
        scheduler.register(
            "reward-check",
            Duration::from_secs(config.scheduling.reward_check_secs),
            move || {
                let orchestrator = orchestrator.clone();
                async move {
                    if let Err(err) = orchestrator.check_reward_token().await {
                        error!("Reward re-selection failed: {}", err);
                    }
                }
            },
        );
    }

    let api_server = api::start_server(orchestrator.clone(), &config.api).await?;

    info!("Keeper started successfully. Press Ctrl+C to shut down.");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = api_server => {
            info!("API server finished");
        }
    }

    scheduler.shutdown();
    info!("Surge keeper stopped");
    Ok(())
}

fn build_adapters(config: &KeeperConfig, keypair_path: Option<&str>) -> Result<Adapters> {
    match config.mode {
        RunMode::Simulation => {
            info!("Wiring simulation adapters (no network access)");
            let ledger = Arc::new(SimLedger::new(
                config.token.mint,
                config.fees.initial_rate_bps,
            ));
            ledger.set_keeper_lamports(config.keeper_balance.target_lamports);
            let router = Arc::new(SimRouter::new());
            router.settle_against(ledger.clone());

            Ok(Adapters {
                ledger,
                router,
                market: Arc::new(SimMarketData::new()),
                social: Arc::new(SimSocialSource::new()),
            })
        }
        RunMode::Live => {
            let keypair_path = keypair_path
                .ok_or_else(|| anyhow::anyhow!("--keypair is required in live mode"))?;
            let keypair: Keypair = read_keypair_file(keypair_path)
                .map_err(|e| anyhow::anyhow!("failed to load keypair {}: {}", keypair_path, e))?;
            info!("Keeper authority: {}", keypair.pubkey());
            let signer = Arc::new(keypair);

            let ledger = Arc::new(LiveLedgerClient::new(
                config.network.rpc_url.clone(),
                config.token.vault_program,
                config.token.mint,
                config.token.vault,
                signer.clone(),
            ));
            let router = Arc::new(JupiterRouter::new(
                config.swap.quote_api_url.clone(),
                signer.pubkey(),
            ));
            let market = Arc::new(HttpMarketData::new(
                config.market.api_url.clone(),
                config.market.api_key.clone(),
            ));
            let social = Arc::new(HttpSocialSource::new(
                config.social.api_url.clone(),
                config.social.account.clone(),
            ));
            Ok(Adapters {
                ledger,
                router,
                market,
                social,
            })
        }
    }
}

fn build_orchestrator(config: &KeeperConfig, adapters: &Adapters) -> Orchestrator {
    let retry = config.retry.policy();

    let fee_lifecycle = FeeLifecycleManager::new(config.fees.clone());
    let harvest = HarvestCoordinator::new(
        adapters.ledger.clone(),
        config.harvest.clone(),
        retry,
        config.token.mint,
    );
    let planner = SwapPlanner::new(
        adapters.router.clone(),
        config.swap.clone(),
        config.keeper_balance.clone(),
        &config.distribution,
        config.token.mint,
        retry,
    );
    let distribution = DistributionEngine::new(
        adapters.ledger.clone(),
        adapters.market.clone(),
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
        adapters.social.clone(),
        adapters.market.clone(),
        config.market.clone(),
        retry,
    );

    Orchestrator::new(
        config,
        adapters.ledger.clone(),
        fee_lifecycle,
        harvest,
        planner,
        distribution,
        selector,
    )
}

fn init_logging(config: &KeeperConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("surge_keeper={}", config.monitoring.log_level).into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}
