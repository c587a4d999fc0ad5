//! Shared value types for the chain-gateway contract.
//!
//! The gateway deliberately stays chain-agnostic: addresses, transaction
//! signatures and amounts are opaque strings/integers here. Concrete chain
//! clients (EVM, Cosmos, Solana, ...) translate their native representations
//! into these types at the boundary; none of that translation lives in this
//! crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Micro-units of the settlement stablecoin (6 decimals), signed so ledger
/// math can represent debits as negative amounts.
pub type MicroUnits = i64;

/// Opaque chain identifier, e.g. `"evm:8453"` or `"cosmos:osmosis-1"`.
/// The gateway never parses this; it is passed straight through to whichever
/// concrete client backs a given deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque on-chain address. Validity is chain-specific and delegated to
/// [`crate::ChainGateway::is_valid_address`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transaction signature/hash as returned by the underlying chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl std::fmt::Display for TxSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single observed inbound transfer to a watched deposit address.
///
/// `tx_sig` + `log_idx` form the dedup key a caller must use to avoid
/// double-crediting the same on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositObservation {
    pub address: Address,
    pub tx_sig: TxSignature,
    pub log_idx: i32,
    pub amount_u: MicroUnits,
    pub confirmations: u32,
    pub observed_at_unix: i64,
}

/// Outcome of submitting a withdrawal to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub tx_sig: TxSignature,
    pub submitted_at_unix: i64,
}

/// A BIP-21-style payment URI built for a deposit address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUri(pub String);

impl std::fmt::Display for PaymentUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied identity used to derive a deterministic deposit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDerivationKey {
    pub user_id: Uuid,
    pub intent_id: Uuid,
}
