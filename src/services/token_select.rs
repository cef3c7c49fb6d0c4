//! Reward-asset re-selection
//!
//! Once a week the latest post from the configured account is scanned for a
//! `$SYMBOL` ticker; the highest-24h-volume asset matching the symbol
//! becomes the new reward asset if it passes the liquidity check. SOL is
//! the reward asset until a selection succeeds.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::config::MarketDataConfig;
use crate::core::error::KeeperResult;
use crate::core::retry::{retry_read, RetryPolicy};
use crate::core::traits::{MarketDataSource, SocialPostSource};
use crate::core::types::{CandidateAsset, SOL_MINT};

const MIN_SYMBOL_LEN: usize = 2;
const MAX_SYMBOL_LEN: usize = 10;

/// Extract the first `$SYMBOL` token from post text. Symbols are 2-10
/// ASCII alphanumerics starting with a letter; anything else is rejected.
pub fn extract_symbol(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
                end += 1;
            }
            let len = end - start;
            if (MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).contains(&len)
                && bytes[start].is_ascii_alphabetic()
            {
                return Some(text[start..end].to_uppercase());
            }
            i = end;
        } else {
            i += 1;
        }
    }
    None
}

struct SelectionState {
    reward_mint: Pubkey,
    last_checked: Option<i64>,
    last_post_id: Option<String>,
}

pub struct TokenSelector {
    social: Arc<dyn SocialPostSource>,
    market: Arc<dyn MarketDataSource>,
    config: MarketDataConfig,
    retry: RetryPolicy,
    state: Mutex<SelectionState>,
}

impl TokenSelector {
    pub fn new(
        social: Arc<dyn SocialPostSource>,
        market: Arc<dyn MarketDataSource>,
        config: MarketDataConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            social,
            market,
            config,
            retry,
            state: Mutex::new(SelectionState {
                reward_mint: SOL_MINT,
                last_checked: None,
                last_post_id: None,
            }),
        }
    }

    pub fn current_reward_mint(&self) -> Pubkey {
        self.state.lock().unwrap().reward_mint
    }

    /// The weekly gate: due on the first check of each ISO week.
    pub fn is_due(&self, now: i64) -> bool {
        let last = self.state.lock().unwrap().last_checked;
        match last {
            None => true,
            Some(last) => !same_week(last, now),
        }
    }

    /// Run one selection pass: fetch the latest post, extract the symbol,
    /// rank candidates by 24h volume, and adopt the winner if it clears
    /// the liquidity floor. Returns the new mint when a change happened.
    pub async fn check_and_select(&self, now: i64) -> KeeperResult<Option<Pubkey>> {
        self.state.lock().unwrap().last_checked = Some(now);

        let post = match self.social.latest_post().await? {
            Some(post) => post,
            None => {
                info!("No post available for reward selection");
                return Ok(None);
            }
        };

        {
            let state = self.state.lock().unwrap();
            if state.last_post_id.as_deref() == Some(post.id.as_str()) {
                info!("Post {} already processed, keeping current reward asset", post.id);
                return Ok(None);
            }
        }

        let symbol = match extract_symbol(&post.text) {
            Some(symbol) => symbol,
            None => {
                warn!("No valid $SYMBOL found in post {}", post.id);
                return Ok(None);
            }
        };
        info!("Extracted reward symbol {} from post {}", symbol, post.id);

        let candidates = retry_read(&self.retry, "symbol search", || {
            self.market.search_by_symbol(&symbol)
        })
        .await?;

        let winner = match pick_candidate(&candidates, self.config.min_candidate_liquidity_usd) {
            Some(winner) => winner,
            None => {
                warn!(
                    "No candidate for {} passed validation ({} returned)",
                    symbol,
                    candidates.len()
                );
                return Ok(None);
            }
        };

        let mut state = self.state.lock().unwrap();
        state.last_post_id = Some(post.id);
        if state.reward_mint == winner.mint {
            info!("Reward asset unchanged: {}", winner.mint);
            return Ok(None);
        }
        info!(
            "Reward asset updated: {} -> {} ({}, volume {:.0} USD)",
            state.reward_mint, winner.mint, winner.symbol, winner.volume_24h_usd
        );
        state.reward_mint = winner.mint;
        Ok(Some(winner.mint))
    }
}

/// Highest 24h volume wins among candidates above the liquidity floor
fn pick_candidate(candidates: &[CandidateAsset], min_liquidity_usd: f64) -> Option<&CandidateAsset> {
    candidates
        .iter()
        .filter(|c| c.liquidity_usd >= min_liquidity_usd)
        .max_by(|a, b| {
            a.volume_24h_usd
                .partial_cmp(&b.volume_24h_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn same_week(a: i64, b: i64) -> bool {
    let week_of = |ts: i64| -> Option<(i32, u32)> {
        let dt: DateTime<Utc> = Utc.timestamp_opt(ts, 0).single()?;
        let week = dt.iso_week();
        Some((week.year(), week.week()))
    };
    match (week_of(a), week_of(b)) {
        (Some(wa), Some(wb)) => wa == wb,
        _ => false,
    }
}
