//! Simulated social-post source

use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::error::KeeperResult;
use crate::core::traits::SocialPostSource;
use crate::core::types::SocialPost;

pub struct SimSocialSource {
    post: Mutex<Option<SocialPost>>,
}

impl SimSocialSource {
    pub fn new() -> Self {
        Self {
            post: Mutex::new(None),
        }
    }

    pub fn set_post(&self, id: &str, text: &str) {
        *self.post.lock().unwrap() = Some(SocialPost {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    pub fn clear(&self) {
        *self.post.lock().unwrap() = None;
    }
}

impl Default for SimSocialSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocialPostSource for SimSocialSource {
    async fn latest_post(&self) -> KeeperResult<Option<SocialPost>> {
        Ok(self.post.lock().unwrap().clone())
    }
}
