//! Domain error taxonomy, mirroring `domain/errors.py` from the original
//! implementation's `ErrorSeverity`/`ErrorCategory` classification.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient funds: user={user_id} account={account:?} requested={requested} available={available}")]
    InsufficientFunds {
        user_id: uuid::Uuid,
        account: crate::types::Account,
        requested: i64,
        available: i64,
    },

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("confirmation lookup regressed, possible reorg: {0}")]
    ConfirmationReorg(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("ledger imbalance: postings summed to {sum_u}, expected 0")]
    LedgerImbalance { sum_u: i64 },

    #[error("invalid round state: round={round_id} expected one of {expected:?}, found {found:?}")]
    InvalidRoundState {
        round_id: uuid::Uuid,
        expected: Vec<crate::types::RoundStatus>,
        found: crate::types::RoundStatus,
    },
}

impl EngineError {
    pub fn severity(&self) -> ErrorSeverity {
        use EngineError::*;
        match self {
            Network(_) | RateLimited(_) => ErrorSeverity::Low,
            Validation(_) | ConfirmationReorg(_) | OracleUnavailable(_) | InvalidRoundState { .. } => {
                ErrorSeverity::Medium
            }
            InsufficientFunds { .. } | Transaction(_) | Configuration(_) => ErrorSeverity::High,
            Security(_) | DataIntegrity(_) | LedgerImbalance { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether the *operation* should be retried. Note `OracleUnavailable`
    /// is only retryable while the round is still within its grace window;
    /// callers check that separately before acting on this flag.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_)
                | EngineError::RateLimited(_)
                | EngineError::ConfirmationReorg(_)
                | EngineError::OracleUnavailable(_)
        )
    }
}
