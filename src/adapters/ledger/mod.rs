//! Ledger / vault-program adapters

pub mod mock;
pub mod rpc;

pub use mock::SimLedger;
pub use rpc::{LightRpcClient, LiveLedgerClient};
