//! Surge Keeper Library
//!
//! Off-chain automation agent for the Surge fee-on-transfer token: watches
//! accumulated withheld fees, harvests them past a threshold under a
//! durable single-owner lock, converts the proceeds into the selected
//! reward asset, and distributes pro-rata to eligible holders with
//! rollover of anything undistributable.

#![allow(dead_code)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod scheduler;
pub mod services;

// Re-export commonly used types
pub use crate::config::{KeeperConfig, RunMode};
pub use crate::core::{KeeperError, KeeperResult};
pub use crate::scheduler::Scheduler;
pub use crate::services::{
    DistributionEngine, FeeLifecycleManager, HarvestCoordinator, Orchestrator, SwapPlanner,
    TokenSelector,
};
