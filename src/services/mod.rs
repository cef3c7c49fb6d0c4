//! Tax-flow orchestration services

pub mod distribution;
pub mod fee_lifecycle;
pub mod harvest;
pub mod orchestrator;
pub mod swap_planner;
pub mod token_select;

pub use distribution::DistributionEngine;
pub use fee_lifecycle::FeeLifecycleManager;
pub use harvest::HarvestCoordinator;
pub use orchestrator::{Orchestrator, StatusReport};
pub use swap_planner::SwapPlanner;
pub use token_select::TokenSelector;
