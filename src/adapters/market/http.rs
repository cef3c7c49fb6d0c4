//! Live market-data client (prices, holder sets, symbol search)

use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::MarketDataSource;
use crate::core::types::{CandidateAsset, TokenHolder};

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: PriceData,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct HoldersResponse {
    data: HoldersData,
}

#[derive(Debug, Deserialize)]
struct HoldersData {
    items: Vec<HolderItem>,
}

#[derive(Debug, Deserialize)]
struct HolderItem {
    owner: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    address: String,
    symbol: String,
    #[serde(rename = "volume24hUsd", default)]
    volume_24h_usd: f64,
    #[serde(rename = "liquidityUsd", default)]
    liquidity_usd: f64,
}

/// Market data over the public token-data HTTP API
pub struct HttpMarketData {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpMarketData {
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            base_url,
            api_key,
            http,
        }
    }

    async fn get_json<T>(&self, path: &str) -> KeeperResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(KeeperError::External(ExternalError::Http(format!(
                "market API returned {} for {}",
                response.status(),
                path
            ))));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    async fn token_price_usd(&self, mint: &Pubkey) -> KeeperResult<f64> {
        let response: PriceResponse = self
            .get_json(&format!("/defi/price?address={}", mint))
            .await?;
        debug!("Price for {}: {} USD", mint, response.data.value);
        Ok(response.data.value)
    }

    async fn token_holders(&self, mint: &Pubkey, limit: usize) -> KeeperResult<Vec<TokenHolder>> {
        let response: HoldersResponse = self
            .get_json(&format!(
                "/defi/v3/token/holder?address={}&limit={}",
                mint, limit
            ))
            .await?;

        let mut holders = Vec::with_capacity(response.data.items.len());
        for item in response.data.items {
            let address = match Pubkey::from_str(&item.owner) {
                Ok(address) => address,
                Err(_) => {
                    warn!("Skipping holder with invalid address: {}", item.owner);
                    continue;
                }
            };
            let balance = item.amount.parse().unwrap_or(0);
            if balance > 0 {
                holders.push(TokenHolder { address, balance });
            }
        }
        Ok(holders)
    }

    async fn search_by_symbol(&self, symbol: &str) -> KeeperResult<Vec<CandidateAsset>> {
        let response: SearchResponse = self
            .get_json(&format!("/defi/v3/search?keyword={}", symbol))
            .await?;

        let candidates = response
            .data
            .items
            .into_iter()
            .filter(|item| item.symbol.eq_ignore_ascii_case(symbol))
            .filter_map(|item| {
                let mint = Pubkey::from_str(&item.address).ok()?;
                Some(CandidateAsset {
                    mint,
                    symbol: item.symbol,
                    volume_24h_usd: item.volume_24h_usd,
                    liquidity_usd: item.liquidity_usd,
                })
            })
            .collect();
        Ok(candidates)
    }
}
