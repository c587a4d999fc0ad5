//! Error taxonomy for the chain-gateway contract.
//!
//! Mirrors the severity/retryability classification used throughout the
//! settlement engine so callers can make uniform retry decisions regardless
//! of which concrete chain client raised the error.

use thiserror::Error;

/// How costly/unexpected a failure is. Drives alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error talking to chain: {0}")]
    Network(String),

    #[error("rate limited by upstream RPC: {0}")]
    RateLimited(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("confirmation lookup failed, possible reorg: {0}")]
    Confirmation(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GatewayError::Network(_) => ErrorSeverity::Low,
            GatewayError::RateLimited(_) => ErrorSeverity::Low,
            GatewayError::InvalidAddress(_) => ErrorSeverity::Medium,
            GatewayError::Transaction(_) => ErrorSeverity::High,
            GatewayError::Confirmation(_) => ErrorSeverity::Medium,
            GatewayError::Configuration(_) => ErrorSeverity::High,
        }
    }

    /// Whether a caller should retry this operation with backoff.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::RateLimited(_) | GatewayError::Confirmation(_)
        )
    }
}
