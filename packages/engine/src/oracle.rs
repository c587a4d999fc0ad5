//! Price oracle contract. Like `ChainGateway`, this crate ships no concrete
//! feed — wiring a real price source is left to the operator.

use async_trait::async_trait;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    /// Fixed-point price, same micro-unit convention as the ledger.
    pub price: i64,
    pub observed_at_unix: i64,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Reference price as close as possible to `at_unix`. Returns
    /// `EngineError::OracleUnavailable` if no sample is available yet —
    /// callers decide whether to keep retrying within the round's grace
    /// window or give up and void the round.
    async fn get_price(&self, at_unix: i64) -> Result<PriceSample, EngineError>;
}
