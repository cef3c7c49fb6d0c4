//! Centralized error types for the Surge keeper

use thiserror::Error;

/// Main keeper error type
#[derive(Error, Debug)]
pub enum KeeperError {
    /// The harvest lock is already held by another instance. Expected under
    /// normal operation and never logged as an error.
    #[error("Harvest lock contention: held by {holder}")]
    LockContention { holder: String },

    /// Accumulated fees are below the harvest threshold. Normal no-op.
    #[error("Harvest threshold not met: {current} < {threshold}")]
    ThresholdNotMet { current: u64, threshold: u64 },

    #[error("External call failed: {0}")]
    External(#[from] ExternalError),

    /// A quoted swap leg exceeds the price-impact ceiling. Hard abort,
    /// never retried with the same parameters.
    #[error("Price impact {impact_bps} bps exceeds ceiling {ceiling_bps} bps for {from} -> {to}")]
    PriceImpactExceeded {
        from: String,
        to: String,
        impact_bps: u32,
        ceiling_bps: u32,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A defect: an internal invariant did not hold. The current operation
    /// halts rather than silently correcting the amounts.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from external collaborators (ledger RPC, swap router, market data)
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type alias for keeper operations
pub type KeeperResult<T> = Result<T, KeeperError>;

impl KeeperError {
    /// Whether this failure is expected during normal operation and should
    /// be handled quietly by the orchestrator.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            KeeperError::LockContention { .. } | KeeperError::ThresholdNotMet { .. }
        )
    }

    /// Whether the underlying call may be retried. Only read-only queries
    /// qualify; state-mutating operations must never auto-retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeeperError::External(_))
    }
}

impl From<reqwest::Error> for KeeperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KeeperError::External(ExternalError::Timeout(std::time::Duration::from_secs(30)))
        } else {
            KeeperError::External(ExternalError::Http(err.to_string()))
        }
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for KeeperError {
    fn from(err: std::io::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}
