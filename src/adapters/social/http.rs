//! Live social-post source
//!
//! Fetches the configured account's pinned post. Only the post text reaches
//! the core, which extracts a `$SYMBOL` token from it.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::core::error::{ExternalError, KeeperError, KeeperResult};
use crate::core::traits::SocialPostSource;
use crate::core::types::SocialPost;

#[derive(Debug, Deserialize)]
struct PinnedPostResponse {
    data: Option<PostData>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    text: String,
}

pub struct HttpSocialSource {
    base_url: String,
    account: String,
    http: reqwest::Client,
}

impl HttpSocialSource {
    pub fn new(base_url: String, account: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            base_url,
            account,
            http,
        }
    }
}

#[async_trait]
impl SocialPostSource for HttpSocialSource {
    async fn latest_post(&self) -> KeeperResult<Option<SocialPost>> {
        let url = format!("{}/users/by/{}/pinned_post", self.base_url, self.account);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(KeeperError::External(ExternalError::Http(format!(
                "social API returned {}",
                response.status()
            ))));
        }
        let parsed: PinnedPostResponse = response.json().await?;
        let post = parsed.data.map(|data| SocialPost {
            id: data.id,
            text: data.text,
        });
        debug!("Latest post for {}: {:?}", self.account, post.as_ref().map(|p| &p.id));
        Ok(post)
    }
}
