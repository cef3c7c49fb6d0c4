//! Capability ports consumed by the orchestration core.
//!
//! The services are written once against these traits and never branch on
//! which implementation is wired in; `main.rs` selects the live or
//! simulation adapter per port at startup.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use super::error::KeeperResult;
use super::types::*;

/// Ledger / fee-program port: withheld-fee queries, harvest execution,
/// the durable harvest lock, and token transfers out of the vault.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sum per-account withheld fees. Side-effect free, freely retryable.
    async fn query_withheld_fees(&self) -> KeeperResult<WithheldFeesSnapshot>;

    /// Harvest withheld fees from one batch of token accounts.
    async fn harvest_batch(&self, accounts: &[Pubkey]) -> KeeperResult<TxReceipt>;

    /// Move fees withheld at the mint level into the vault.
    async fn withdraw_from_mint(&self) -> KeeperResult<TxReceipt>;

    /// Update the transfer-fee rate, optionally revoking update authority.
    async fn update_fee_rate(&self, rate_bps: u16, revoke_authority: bool)
        -> KeeperResult<TxReceipt>;

    /// Atomically acquire the harvest lock for `holder`. Returns `false`
    /// when the lock is already held; acquire-or-fail, never read-then-write.
    async fn try_acquire_harvest_lock(&self, holder: &str) -> KeeperResult<bool>;

    /// Release the harvest lock. Must succeed for the current holder even
    /// after a failed harvest.
    async fn release_harvest_lock(&self, holder: &str) -> KeeperResult<()>;

    /// Current lock state, for status reporting.
    async fn harvest_lock_state(&self) -> KeeperResult<HarvestLockState>;

    /// Keeper operating balance in lamports.
    async fn keeper_balance(&self) -> KeeperResult<u64>;

    /// Vault balance for a mint, in smallest units.
    async fn vault_balance(&self, mint: &Pubkey) -> KeeperResult<u64>;

    /// Transfer out of the vault to a single recipient.
    async fn transfer(&self, mint: &Pubkey, to: &Pubkey, amount: u64) -> KeeperResult<TxReceipt>;

    /// Transfer out of the vault to a batch of recipients in one transaction.
    async fn transfer_batch(
        &self,
        mint: &Pubkey,
        transfers: &[(Pubkey, u64)],
    ) -> KeeperResult<TxReceipt>;
}

/// Swap-routing port (aggregator quote + execute)
#[async_trait]
pub trait SwapRouter: Send + Sync {
    /// Quote a conversion. Read-only and retryable.
    async fn get_quote(
        &self,
        from_mint: &Pubkey,
        to_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> KeeperResult<SwapQuote>;

    /// Execute a previously obtained quote. Never auto-retried.
    async fn execute_swap(&self, quote: &SwapQuote) -> KeeperResult<SwapReceipt>;
}

/// Receipt for an executed swap
#[derive(Debug, Clone)]
pub struct SwapReceipt {
    pub signature: String,
    pub in_amount: u64,
    pub out_amount: u64,
}

/// Market-data port: prices, holder sets and symbol search
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current USD price for a mint.
    async fn token_price_usd(&self, mint: &Pubkey) -> KeeperResult<f64>;

    /// Top holders of a mint by balance, up to `limit`.
    async fn token_holders(&self, mint: &Pubkey, limit: usize) -> KeeperResult<Vec<TokenHolder>>;

    /// Candidate assets matching a ticker symbol.
    async fn search_by_symbol(&self, symbol: &str) -> KeeperResult<Vec<CandidateAsset>>;
}

/// Social-post port, used only to discover the next reward-asset symbol
#[async_trait]
pub trait SocialPostSource: Send + Sync {
    async fn latest_post(&self) -> KeeperResult<Option<SocialPost>>;
}
