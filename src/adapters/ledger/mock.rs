//! In-memory simulation ledger for development and tests
//!
//! The harvest lock is a single compare-and-swap so that concurrent
//! acquirers resolve to exactly one winner, matching the durable on-chain
//! lock the live adapter talks to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info};

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::LedgerClient;
use crate::core::types::*;

/// A recorded outbound transfer, for assertions in tests
#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub mint: Pubkey,
    pub to: Pubkey,
    pub amount: u64,
}

#[derive(Default)]
struct FailureInjection {
    /// Harvest batches at or after this index fail
    fail_harvest_from_batch: Option<usize>,
    /// Transfer batch calls with these indices fail
    fail_transfer_batches: Vec<usize>,
    /// Every transfer fails
    fail_all_transfers: bool,
}

/// Simulation ledger backing every `LedgerClient` operation with in-memory
/// state. Seed helpers mirror the live system's externally-driven state.
pub struct SimLedger {
    token_mint: Pubkey,
    lock: AtomicBool,
    lock_holder: Mutex<Option<String>>,
    withheld: Mutex<Vec<WithheldAccount>>,
    mint_withheld: AtomicU64,
    vault_balances: Mutex<HashMap<Pubkey, u64>>,
    keeper_lamports: AtomicU64,
    fee_rate_bps: AtomicU64,
    authority_revoked: AtomicBool,
    transfers: Mutex<Vec<RecordedTransfer>>,
    transfer_batch_calls: AtomicUsize,
    harvest_batch_calls: AtomicUsize,
    sequence: AtomicU64,
    failures: Mutex<FailureInjection>,
    /// Artificial latency per harvest batch, to widen the critical section
    /// in concurrency tests
    harvest_delay_ms: AtomicU64,
}

impl SimLedger {
    pub fn new(token_mint: Pubkey, initial_rate_bps: u16) -> Self {
        Self {
            token_mint,
            lock: AtomicBool::new(false),
            lock_holder: Mutex::new(None),
            withheld: Mutex::new(Vec::new()),
            mint_withheld: AtomicU64::new(0),
            vault_balances: Mutex::new(HashMap::new()),
            keeper_lamports: AtomicU64::new(0),
            fee_rate_bps: AtomicU64::new(initial_rate_bps as u64),
            authority_revoked: AtomicBool::new(false),
            transfers: Mutex::new(Vec::new()),
            transfer_batch_calls: AtomicUsize::new(0),
            harvest_batch_calls: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            failures: Mutex::new(FailureInjection::default()),
            harvest_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_harvest_delay_ms(&self, delay_ms: u64) {
        self.harvest_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    fn next_signature(&self, tag: &str) -> TxReceipt {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        TxReceipt {
            signature: format!("sim-{}-{}", tag, seq),
            slot: 1_000_000 + seq,
        }
    }

    /// Seed withheld fees across simulated token accounts
    pub fn seed_withheld(&self, per_account: &[u64]) {
        let mut withheld = self.withheld.lock().unwrap();
        for amount in per_account {
            withheld.push(WithheldAccount {
                address: Pubkey::new_unique(),
                withheld_amount: *amount,
            });
        }
        info!("Seeded {} accounts with withheld fees", per_account.len());
    }

    pub fn set_keeper_lamports(&self, lamports: u64) {
        self.keeper_lamports.store(lamports, Ordering::SeqCst);
    }

    pub fn set_vault_balance(&self, mint: Pubkey, amount: u64) {
        self.vault_balances.lock().unwrap().insert(mint, amount);
    }

    /// Swap settlement hooks used by the simulation router: an executed
    /// swap consumes the input asset from the vault and lands the output
    /// asset there.
    pub fn debit_vault(&self, mint: Pubkey, amount: u64) {
        let mut vault = self.vault_balances.lock().unwrap();
        let balance = vault.entry(mint).or_insert(0);
        *balance = balance.saturating_sub(amount);
    }

    pub fn credit_vault(&self, mint: Pubkey, amount: u64) {
        let mut vault = self.vault_balances.lock().unwrap();
        *vault.entry(mint).or_insert(0) += amount;
    }

    pub fn fail_harvest_from_batch(&self, batch_index: usize) {
        self.failures.lock().unwrap().fail_harvest_from_batch = Some(batch_index);
    }

    pub fn fail_transfer_batches(&self, indices: Vec<usize>) {
        self.failures.lock().unwrap().fail_transfer_batches = indices;
    }

    pub fn fail_all_transfers(&self, fail: bool) {
        self.failures.lock().unwrap().fail_all_transfers = fail;
    }

    pub fn recorded_transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn current_fee_rate_bps(&self) -> u16 {
        self.fee_rate_bps.load(Ordering::SeqCst) as u16
    }

    pub fn authority_revoked(&self) -> bool {
        self.authority_revoked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for SimLedger {
    async fn query_withheld_fees(&self) -> KeeperResult<WithheldFeesSnapshot> {
        let accounts = self.withheld.lock().unwrap().clone();
        let total_withheld = accounts.iter().map(|a| a.withheld_amount).sum();
        Ok(WithheldFeesSnapshot {
            total_withheld,
            accounts,
        })
    }

    async fn harvest_batch(&self, accounts: &[Pubkey]) -> KeeperResult<TxReceipt> {
        let delay_ms = self.harvest_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        let call_index = self.harvest_batch_calls.fetch_add(1, Ordering::SeqCst);
        let fail_from = self.failures.lock().unwrap().fail_harvest_from_batch;
        if let Some(from) = fail_from {
            if call_index >= from {
                return Err(KeeperError::External(ExternalError::Rpc(format!(
                    "simulated harvest batch {} failure",
                    call_index
                ))));
            }
        }

        let mut moved = 0u64;
        {
            let mut withheld = self.withheld.lock().unwrap();
            for entry in withheld.iter_mut() {
                if accounts.contains(&entry.address) {
                    moved += entry.withheld_amount;
                    entry.withheld_amount = 0;
                }
            }
        }
        self.mint_withheld.fetch_add(moved, Ordering::SeqCst);
        debug!("Harvested {} from {} accounts", moved, accounts.len());
        Ok(self.next_signature("harvest"))
    }

    async fn withdraw_from_mint(&self) -> KeeperResult<TxReceipt> {
        let amount = self.mint_withheld.swap(0, Ordering::SeqCst);
        let mut vault = self.vault_balances.lock().unwrap();
        *vault.entry(self.token_mint).or_insert(0) += amount;
        debug!("Withdrew {} from mint into vault", amount);
        Ok(self.next_signature("withdraw"))
    }

    async fn update_fee_rate(
        &self,
        rate_bps: u16,
        revoke_authority: bool,
    ) -> KeeperResult<TxReceipt> {
        if self.authority_revoked.load(Ordering::SeqCst) {
            return Err(KeeperError::External(ExternalError::Rpc(
                "fee update authority revoked".to_string(),
            )));
        }
        self.fee_rate_bps.store(rate_bps as u64, Ordering::SeqCst);
        if revoke_authority {
            self.authority_revoked.store(true, Ordering::SeqCst);
        }
        info!(
            "Fee rate set to {} bps (revoke_authority={})",
            rate_bps, revoke_authority
        );
        Ok(self.next_signature("fee-update"))
    }

    async fn try_acquire_harvest_lock(&self, holder: &str) -> KeeperResult<bool> {
        if self
            .lock
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.lock_holder.lock().unwrap() = Some(holder.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_harvest_lock(&self, holder: &str) -> KeeperResult<()> {
        let mut current = self.lock_holder.lock().unwrap();
        if current.as_deref() == Some(holder) {
            *current = None;
            self.lock.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn harvest_lock_state(&self) -> KeeperResult<HarvestLockState> {
        Ok(HarvestLockState {
            held: self.lock.load(Ordering::SeqCst),
            holder: self.lock_holder.lock().unwrap().clone(),
        })
    }

    async fn keeper_balance(&self) -> KeeperResult<u64> {
        Ok(self.keeper_lamports.load(Ordering::SeqCst))
    }

    async fn vault_balance(&self, mint: &Pubkey) -> KeeperResult<u64> {
        Ok(*self.vault_balances.lock().unwrap().get(mint).unwrap_or(&0))
    }

    async fn transfer(&self, mint: &Pubkey, to: &Pubkey, amount: u64) -> KeeperResult<TxReceipt> {
        if self.failures.lock().unwrap().fail_all_transfers {
            return Err(KeeperError::External(ExternalError::Rpc(
                "simulated transfer failure".to_string(),
            )));
        }
        {
            let mut vault = self.vault_balances.lock().unwrap();
            let balance = vault.entry(*mint).or_insert(0);
            *balance = balance.saturating_sub(amount);
        }
        self.transfers.lock().unwrap().push(RecordedTransfer {
            mint: *mint,
            to: *to,
            amount,
        });
        Ok(self.next_signature("transfer"))
    }

    async fn transfer_batch(
        &self,
        mint: &Pubkey,
        transfers: &[(Pubkey, u64)],
    ) -> KeeperResult<TxReceipt> {
        let call_index = self.transfer_batch_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.lock().unwrap();
        if failures.fail_all_transfers || failures.fail_transfer_batches.contains(&call_index) {
            return Err(KeeperError::External(ExternalError::Rpc(format!(
                "simulated transfer batch {} failure",
                call_index
            ))));
        }
        drop(failures);

        let total: u64 = transfers.iter().map(|(_, amount)| amount).sum();
        {
            let mut vault = self.vault_balances.lock().unwrap();
            let balance = vault.entry(*mint).or_insert(0);
            *balance = balance.saturating_sub(total);
        }
        let mut recorded = self.transfers.lock().unwrap();
        for (to, amount) in transfers {
            recorded.push(RecordedTransfer {
                mint: *mint,
                to: *to,
                amount: *amount,
            });
        }
        Ok(self.next_signature("transfer-batch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lock_is_single_winner() {
        let ledger = Arc::new(SimLedger::new(Pubkey::new_unique(), 3000));
        let a = ledger.try_acquire_harvest_lock("a").await.unwrap();
        let b = ledger.try_acquire_harvest_lock("b").await.unwrap();
        assert!(a);
        assert!(!b);

        ledger.release_harvest_lock("a").await.unwrap();
        assert!(ledger.try_acquire_harvest_lock("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_ignores_non_holder() {
        let ledger = SimLedger::new(Pubkey::new_unique(), 3000);
        assert!(ledger.try_acquire_harvest_lock("a").await.unwrap());
        ledger.release_harvest_lock("b").await.unwrap();
        let state = ledger.harvest_lock_state().await.unwrap();
        assert!(state.held);
        assert_eq!(state.holder.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_harvest_moves_fees_into_vault() {
        let mint = Pubkey::new_unique();
        let ledger = SimLedger::new(mint, 3000);
        ledger.seed_withheld(&[100, 200, 300]);

        let snapshot = ledger.query_withheld_fees().await.unwrap();
        assert_eq!(snapshot.total_withheld, 600);

        let addresses: Vec<Pubkey> = snapshot.accounts.iter().map(|a| a.address).collect();
        ledger.harvest_batch(&addresses).await.unwrap();
        ledger.withdraw_from_mint().await.unwrap();

        assert_eq!(ledger.vault_balance(&mint).await.unwrap(), 600);
        assert_eq!(ledger.query_withheld_fees().await.unwrap().total_withheld, 0);
    }
}
