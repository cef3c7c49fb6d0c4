//! Bounded exponential backoff for read-only external calls.
//!
//! State-mutating operations must not be routed through this helper; a
//! repeated write can double-execute, a repeated read cannot.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::{KeeperError, KeeperResult};

/// Retry parameters, normally sourced from `RetryConfig` in the app config.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(self.base_delay_ms);
        }
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((exponential as u64).min(self.max_delay_ms))
    }
}

/// Run a read-only operation with bounded retries. Non-retryable errors
/// (contention, validation, invariant violations) propagate immediately.
pub async fn retry_read<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> KeeperResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = KeeperResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label,
                    attempt + 1,
                    policy.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ExternalError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        // Caps at max_delay_ms
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let policy = RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result = retry_read(&policy, "flaky read", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(KeeperError::External(ExternalError::Rpc("transient".into())))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_contention() {
        let policy = RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: KeeperResult<()> = retry_read(&policy, "locked", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(KeeperError::LockContention {
                    holder: "other".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(KeeperError::LockContention { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
