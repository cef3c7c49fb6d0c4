//! Aggregator-backed swap routing over the v6 quote/swap HTTP API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::{SwapReceipt, SwapRouter};
use crate::core::types::SwapQuote;

/// Quote response (simplified to the fields the planner needs)
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "inputMint")]
    input_mint: String,
    #[serde(rename = "outputMint")]
    output_mint: String,
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: String,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "txid")]
    txid: String,
    #[serde(rename = "inputAmount")]
    input_amount: Option<String>,
    #[serde(rename = "outputAmount")]
    output_amount: Option<String>,
}

/// Live swap router speaking to the aggregator HTTP API
pub struct JupiterRouter {
    base_url: String,
    http: reqwest::Client,
    user_public_key: Pubkey,
}

impl JupiterRouter {
    pub fn new(base_url: String, user_public_key: Pubkey) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            base_url,
            http,
            user_public_key,
        }
    }

    fn parse_amount(value: &str, field: &str) -> KeeperResult<u64> {
        value.parse().map_err(|_| {
            KeeperError::External(ExternalError::UnexpectedResponse(format!(
                "unparseable {}: {}",
                field, value
            )))
        })
    }

    /// The API reports impact as a percentage string; the planner works in
    /// basis points.
    fn impact_to_bps(pct: &str) -> u32 {
        (pct.parse::<f64>().unwrap_or(0.0) * 100.0).round().max(0.0) as u32
    }
}

#[async_trait]
impl SwapRouter for JupiterRouter {
    async fn get_quote(
        &self,
        from_mint: &Pubkey,
        to_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> KeeperResult<SwapQuote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, from_mint, to_mint, amount, slippage_bps
        );
        debug!("Requesting quote: {} -> {} amount {}", from_mint, to_mint, amount);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(KeeperError::External(ExternalError::Http(format!(
                "quote API returned {}",
                response.status()
            ))));
        }
        let raw: serde_json::Value = response.json().await?;
        let quote: QuoteResponse = serde_json::from_value(raw.clone())?;

        Ok(SwapQuote {
            from_mint: Pubkey::from_str(&quote.input_mint).map_err(|e| {
                KeeperError::External(ExternalError::UnexpectedResponse(e.to_string()))
            })?,
            to_mint: Pubkey::from_str(&quote.output_mint).map_err(|e| {
                KeeperError::External(ExternalError::UnexpectedResponse(e.to_string()))
            })?,
            in_amount: Self::parse_amount(&quote.in_amount, "inAmount")?,
            out_amount: Self::parse_amount(&quote.out_amount, "outAmount")?,
            price_impact_bps: Self::impact_to_bps(&quote.price_impact_pct),
            slippage_bps,
            route: raw,
        })
    }

    async fn execute_swap(&self, quote: &SwapQuote) -> KeeperResult<SwapReceipt> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote.route,
            "userPublicKey": self.user_public_key.to_string(),
            "wrapAndUnwrapSol": true,
        });

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(KeeperError::External(ExternalError::Http(format!(
                "swap API returned {}",
                response.status()
            ))));
        }
        let swap: SwapResponse = response.json().await?;

        let in_amount = swap
            .input_amount
            .as_deref()
            .map(|v| Self::parse_amount(v, "inputAmount"))
            .transpose()?
            .unwrap_or(quote.in_amount);
        let out_amount = swap
            .output_amount
            .as_deref()
            .map(|v| Self::parse_amount(v, "outputAmount"))
            .transpose()?
            .unwrap_or(quote.out_amount);

        info!(
            "Swap executed: {} {} -> {} {} ({})",
            in_amount, quote.from_mint, out_amount, quote.to_mint, swap.txid
        );
        Ok(SwapReceipt {
            signature: swap.txid,
            in_amount,
            out_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_conversion_to_bps() {
        assert_eq!(JupiterRouter::impact_to_bps("0.5"), 50);
        assert_eq!(JupiterRouter::impact_to_bps("5"), 500);
        assert_eq!(JupiterRouter::impact_to_bps("0"), 0);
        assert_eq!(JupiterRouter::impact_to_bps("garbage"), 0);
    }
}
