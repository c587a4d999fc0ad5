//! Chain-gateway contract consumed by the settlement engine.
//!
//! This crate provides shared functionality consumed by the settlement
//! engine and its chain-specific clients:
//!
//! - **Types** - opaque addresses, deposit observations, withdrawal receipts
//! - **ChainGateway** - the contract a concrete chain client must implement
//! - **Error taxonomy** - severity/retryability classification shared across
//!   whichever chain client backs a deployment
//!
//! No concrete EVM/Cosmos/Solana client lives in this crate; that is
//! deliberately left to the operator deploying the engine.

pub mod error;
pub mod gateway_trait;
pub mod redact;
pub mod types;

pub use error::{ErrorSeverity, GatewayError};
pub use gateway_trait::ChainGateway;
pub use types::{
    Address, AddressDerivationKey, ChainId, DepositObservation, MicroUnits, PaymentUri,
    TxSignature, WithdrawalReceipt,
};
