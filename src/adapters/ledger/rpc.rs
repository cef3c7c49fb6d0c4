//! Live ledger client over JSON-RPC
//!
//! A minimal RPC client implementing only the methods this keeper needs,
//! plus the vault-program instruction plumbing for harvest, lock and
//! transfer operations. The on-chain harvest lock account makes acquisition
//! a single atomic instruction; the program rejects a second acquirer.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use tracing::{debug, info, warn};

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::LedgerClient;
use crate::core::types::*;

const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Token-account extension tag carrying the withheld transfer-fee amount
const TRANSFER_FEE_AMOUNT_EXTENSION: u16 = 1;

/// Base token-account size before TLV extensions
const TOKEN_ACCOUNT_BASE_LEN: usize = 165;

/// Vault program instruction tags
mod ix {
    pub const HARVEST_FEES: u8 = 0;
    pub const WITHDRAW_FROM_MINT: u8 = 1;
    pub const UPDATE_FEE_RATE: u8 = 2;
    pub const ACQUIRE_HARVEST_LOCK: u8 = 3;
    pub const RELEASE_HARVEST_LOCK: u8 = 4;
    pub const VAULT_TRANSFER: u8 = 5;
}

/// JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProgramAccount {
    pubkey: String,
    account: AccountInfo,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    data: (String, String),
}

/// Lightweight JSON-RPC client
pub struct LightRpcClient {
    url: String,
    http: reqwest::Client,
}

impl LightRpcClient {
    pub fn new(url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { url, http }
    }

    async fn call<T>(&self, method: &str, params: Value) -> KeeperResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!("RPC call: {}", method);

        let response = self.http.post(&self.url).json(&body).send().await?;
        let parsed: RpcResponse<T> = response.json().await?;

        if let Some(error) = parsed.error {
            return Err(KeeperError::External(ExternalError::Rpc(format!(
                "{}: {}",
                error.code, error.message
            ))));
        }
        parsed.result.ok_or_else(|| {
            KeeperError::External(ExternalError::UnexpectedResponse(
                "no result in RPC response".to_string(),
            ))
        })
    }

    pub async fn get_balance(&self, pubkey: &Pubkey) -> KeeperResult<u64> {
        let response: Value = self
            .call("getBalance", json!([pubkey.to_string()]))
            .await?;
        response["value"].as_u64().ok_or_else(|| {
            KeeperError::External(ExternalError::UnexpectedResponse(
                "invalid balance response".to_string(),
            ))
        })
    }

    pub async fn get_latest_blockhash(&self) -> KeeperResult<solana_sdk::hash::Hash> {
        let response: Value = self.call("getLatestBlockhash", json!([])).await?;
        let blockhash = response["value"]["blockhash"].as_str().ok_or_else(|| {
            KeeperError::External(ExternalError::UnexpectedResponse(
                "invalid blockhash response".to_string(),
            ))
        })?;
        blockhash.parse().map_err(|e| {
            KeeperError::External(ExternalError::UnexpectedResponse(format!(
                "unparseable blockhash: {}",
                e
            )))
        })
    }

    pub async fn get_slot(&self) -> KeeperResult<u64> {
        self.call("getSlot", json!([])).await
    }

    /// Program accounts for a mint, base64-decoded
    pub async fn get_token_accounts_for_mint(
        &self,
        mint: &Pubkey,
    ) -> KeeperResult<Vec<(Pubkey, Vec<u8>)>> {
        let params = json!([
            TOKEN_2022_PROGRAM,
            {
                "encoding": "base64",
                "commitment": "confirmed",
                "filters": [
                    { "memcmp": { "offset": 0, "bytes": mint.to_string() } }
                ]
            }
        ]);
        let response: Vec<ProgramAccount> = self.call("getProgramAccounts", params).await?;

        let mut accounts = Vec::with_capacity(response.len());
        for entry in response {
            let pubkey = Pubkey::from_str(&entry.pubkey).map_err(|e| {
                KeeperError::External(ExternalError::UnexpectedResponse(format!(
                    "bad pubkey in response: {}",
                    e
                )))
            })?;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&entry.account.data.0)
                .map_err(|e| {
                    KeeperError::External(ExternalError::UnexpectedResponse(format!(
                        "bad account data: {}",
                        e
                    )))
                })?;
            accounts.push((pubkey, data));
        }
        Ok(accounts)
    }

    pub async fn get_account_data(&self, pubkey: &Pubkey) -> KeeperResult<Option<Vec<u8>>> {
        let params = json!([
            pubkey.to_string(),
            { "encoding": "base64", "commitment": "confirmed" }
        ]);
        let response: Value = self.call("getAccountInfo", params).await?;
        if response["value"].is_null() {
            return Ok(None);
        }
        let encoded = response["value"]["data"][0].as_str().ok_or_else(|| {
            KeeperError::External(ExternalError::UnexpectedResponse(
                "invalid account data response".to_string(),
            ))
        })?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                KeeperError::External(ExternalError::UnexpectedResponse(format!(
                    "bad account data: {}",
                    e
                )))
            })?;
        Ok(Some(data))
    }

    pub async fn send_transaction(&self, transaction: &Transaction) -> KeeperResult<String> {
        let serialized = bincode::serialize(transaction)
            .map_err(|e| KeeperError::Serialization(e.to_string()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(serialized);
        let params = json!([
            encoded,
            { "encoding": "base64", "skipPreflight": false, "preflightCommitment": "confirmed" }
        ]);
        self.call("sendTransaction", params).await
    }
}

/// Live `LedgerClient` backed by the vault program
pub struct LiveLedgerClient {
    rpc: LightRpcClient,
    program_id: Pubkey,
    token_mint: Pubkey,
    vault: Pubkey,
    keeper_wallet: Pubkey,
    signer: Arc<Keypair>,
}

impl LiveLedgerClient {
    pub fn new(
        rpc_url: String,
        program_id: Pubkey,
        token_mint: Pubkey,
        vault: Pubkey,
        signer: Arc<Keypair>,
    ) -> Self {
        let keeper_wallet = signer.pubkey();
        Self {
            rpc: LightRpcClient::new(rpc_url),
            program_id,
            token_mint,
            vault,
            keeper_wallet,
            signer,
        }
    }

    fn lock_account(&self) -> Pubkey {
        let (address, _) =
            Pubkey::find_program_address(&[b"harvest_lock", self.vault.as_ref()], &self.program_id);
        address
    }

    /// Withheld amount from a token account's TLV extension region
    fn parse_withheld_amount(data: &[u8]) -> Option<u64> {
        if data.len() <= TOKEN_ACCOUNT_BASE_LEN {
            return None;
        }
        let extensions = &data[TOKEN_ACCOUNT_BASE_LEN..];
        let mut offset = 0usize;
        while offset + 4 <= extensions.len() {
            let ext_type = u16::from_le_bytes(extensions[offset..offset + 2].try_into().ok()?);
            let ext_len =
                u16::from_le_bytes(extensions[offset + 2..offset + 4].try_into().ok()?) as usize;
            offset += 4;
            if ext_type == TRANSFER_FEE_AMOUNT_EXTENSION {
                if offset + 8 > extensions.len() {
                    return None;
                }
                return Some(u64::from_le_bytes(
                    extensions[offset..offset + 8].try_into().ok()?,
                ));
            }
            offset += ext_len;
        }
        None
    }

    /// Token-account balance at its fixed offset
    fn parse_token_amount(data: &[u8]) -> Option<u64> {
        if data.len() < TOKEN_ACCOUNT_BASE_LEN {
            return None;
        }
        Some(u64::from_le_bytes(data[64..72].try_into().ok()?))
    }

    async fn submit(&self, instruction: Instruction, tag: &str) -> KeeperResult<TxReceipt> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.keeper_wallet),
            &[self.signer.as_ref()],
            blockhash,
        );
        let signature = self.rpc.send_transaction(&transaction).await?;
        let slot = self.rpc.get_slot().await.unwrap_or(0);
        info!("{} transaction confirmed: {}", tag, signature);
        Ok(TxReceipt { signature, slot })
    }

    fn vault_instruction(&self, data: Vec<u8>, extra_accounts: Vec<AccountMeta>) -> Instruction {
        let mut accounts = vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new_readonly(self.keeper_wallet, true),
            AccountMeta::new(self.token_mint, false),
        ];
        accounts.extend(extra_accounts);
        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }
}

#[async_trait]
impl LedgerClient for LiveLedgerClient {
    async fn query_withheld_fees(&self) -> KeeperResult<WithheldFeesSnapshot> {
        let accounts = self.rpc.get_token_accounts_for_mint(&self.token_mint).await?;

        let mut snapshot = WithheldFeesSnapshot::default();
        for (address, data) in accounts {
            if let Some(withheld_amount) = Self::parse_withheld_amount(&data) {
                if withheld_amount > 0 {
                    snapshot.total_withheld += withheld_amount;
                    snapshot.accounts.push(WithheldAccount {
                        address,
                        withheld_amount,
                    });
                }
            }
        }
        debug!(
            "Withheld snapshot: {} across {} accounts",
            snapshot.total_withheld,
            snapshot.accounts.len()
        );
        Ok(snapshot)
    }

    async fn harvest_batch(&self, accounts: &[Pubkey]) -> KeeperResult<TxReceipt> {
        let mut data = vec![ix::HARVEST_FEES];
        data.extend_from_slice(&(accounts.len() as u32).to_le_bytes());
        let extra = accounts
            .iter()
            .map(|account| AccountMeta::new(*account, false))
            .collect();
        self.submit(self.vault_instruction(data, extra), "harvest").await
    }

    async fn withdraw_from_mint(&self) -> KeeperResult<TxReceipt> {
        let data = vec![ix::WITHDRAW_FROM_MINT];
        self.submit(self.vault_instruction(data, vec![]), "withdraw")
            .await
    }

    async fn update_fee_rate(
        &self,
        rate_bps: u16,
        revoke_authority: bool,
    ) -> KeeperResult<TxReceipt> {
        let mut data = vec![ix::UPDATE_FEE_RATE];
        data.extend_from_slice(&rate_bps.to_le_bytes());
        data.push(revoke_authority as u8);
        self.submit(self.vault_instruction(data, vec![]), "fee-update")
            .await
    }

    async fn try_acquire_harvest_lock(&self, holder: &str) -> KeeperResult<bool> {
        let mut data = vec![ix::ACQUIRE_HARVEST_LOCK];
        let holder_bytes = holder.as_bytes();
        data.push(holder_bytes.len().min(32) as u8);
        data.extend_from_slice(&holder_bytes[..holder_bytes.len().min(32)]);

        let extra = vec![AccountMeta::new(self.lock_account(), false)];
        match self.submit(self.vault_instruction(data, extra), "lock-acquire").await {
            Ok(_) => Ok(true),
            // The program rejects a second acquirer with its lock-held code;
            // that is contention, not an RPC failure.
            Err(KeeperError::External(ExternalError::Rpc(message)))
                if message.contains("custom program error: 0x177") =>
            {
                debug!("Harvest lock already held");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn release_harvest_lock(&self, holder: &str) -> KeeperResult<()> {
        let mut data = vec![ix::RELEASE_HARVEST_LOCK];
        let holder_bytes = holder.as_bytes();
        data.push(holder_bytes.len().min(32) as u8);
        data.extend_from_slice(&holder_bytes[..holder_bytes.len().min(32)]);

        let extra = vec![AccountMeta::new(self.lock_account(), false)];
        match self.submit(self.vault_instruction(data, extra), "lock-release").await {
            Ok(_) => Ok(()),
            Err(err) => {
                // Release failures are surfaced but not propagated as fatal;
                // the caller already treats release as unconditional.
                warn!("Harvest lock release failed: {}", err);
                Err(err)
            }
        }
    }

    async fn harvest_lock_state(&self) -> KeeperResult<HarvestLockState> {
        let data = match self.rpc.get_account_data(&self.lock_account()).await? {
            Some(data) => data,
            None => return Ok(HarvestLockState::default()),
        };
        // Lock account layout: 8-byte discriminator, held flag, holder length,
        // holder bytes.
        if data.len() < 10 {
            return Ok(HarvestLockState::default());
        }
        let held = data[8] == 1;
        let holder_len = data[9] as usize;
        let holder = if held && data.len() >= 10 + holder_len {
            String::from_utf8(data[10..10 + holder_len].to_vec()).ok()
        } else {
            None
        };
        Ok(HarvestLockState { held, holder })
    }

    async fn keeper_balance(&self) -> KeeperResult<u64> {
        self.rpc.get_balance(&self.keeper_wallet).await
    }

    async fn vault_balance(&self, mint: &Pubkey) -> KeeperResult<u64> {
        if *mint == SOL_MINT {
            return self.rpc.get_balance(&self.vault).await;
        }
        let accounts = self.rpc.get_token_accounts_for_mint(mint).await?;
        let mut total = 0u64;
        for (_, data) in accounts {
            // Owner sits at offset 32..64 of the token account
            if data.len() >= TOKEN_ACCOUNT_BASE_LEN && data[32..64] == self.vault.to_bytes() {
                total += Self::parse_token_amount(&data).unwrap_or(0);
            }
        }
        Ok(total)
    }

    async fn transfer(&self, mint: &Pubkey, to: &Pubkey, amount: u64) -> KeeperResult<TxReceipt> {
        self.transfer_batch(mint, &[(*to, amount)]).await
    }

    async fn transfer_batch(
        &self,
        mint: &Pubkey,
        transfers: &[(Pubkey, u64)],
    ) -> KeeperResult<TxReceipt> {
        let mut data = vec![ix::VAULT_TRANSFER];
        data.extend_from_slice(&(transfers.len() as u32).to_le_bytes());
        for (_, amount) in transfers {
            data.extend_from_slice(&amount.to_le_bytes());
        }
        let mut extra = vec![AccountMeta::new(*mint, false)];
        extra.extend(
            transfers
                .iter()
                .map(|(to, _)| AccountMeta::new(*to, false)),
        );
        self.submit(self.vault_instruction(data, extra), "vault-transfer")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_account_with_withheld(mint: &Pubkey, owner: &Pubkey, amount: u64, withheld: u64) -> Vec<u8> {
        let mut data = vec![0u8; TOKEN_ACCOUNT_BASE_LEN];
        data[0..32].copy_from_slice(&mint.to_bytes());
        data[32..64].copy_from_slice(&owner.to_bytes());
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        // TLV: type=1 (transfer fee amount), len=8, withheld u64
        data.extend_from_slice(&TRANSFER_FEE_AMOUNT_EXTENSION.to_le_bytes());
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(&withheld.to_le_bytes());
        data
    }

    #[test]
    fn test_parses_withheld_amount_from_tlv() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let data = token_account_with_withheld(&mint, &owner, 1_000, 42);
        assert_eq!(LiveLedgerClient::parse_withheld_amount(&data), Some(42));
    }

    #[test]
    fn test_ignores_accounts_without_extensions() {
        let data = vec![0u8; TOKEN_ACCOUNT_BASE_LEN];
        assert_eq!(LiveLedgerClient::parse_withheld_amount(&data), None);
    }

    #[test]
    fn test_parses_token_amount() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let data = token_account_with_withheld(&mint, &owner, 77, 0);
        assert_eq!(LiveLedgerClient::parse_token_amount(&data), Some(77));
    }
}
