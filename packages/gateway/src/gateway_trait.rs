//! The `ChainGateway` contract.
//!
//! This crate intentionally ships no concrete implementation: wiring a real
//! EVM/Cosmos/Solana client behind this trait is the operator's job. The
//! settlement engine depends only on this interface so it can be tested
//! against an in-memory fake and swapped onto a real chain without touching
//! ledger, round or payout logic.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{
    Address, AddressDerivationKey, ChainId, DepositObservation, MicroUnits, PaymentUri,
    TxSignature, WithdrawalReceipt,
};

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Chain this gateway instance talks to.
    fn chain_id(&self) -> ChainId;

    /// Returns deposits observed since `cursor` (an opaque, gateway-defined
    /// position such as a block height or slot). Callers dedup by
    /// `(tx_sig, log_idx)`, never by address+amount.
    async fn watch_deposits(
        &self,
        cursor: Option<String>,
    ) -> Result<(Vec<DepositObservation>, String), GatewayError>;

    /// Submits a withdrawal of `amount_u` micro-units to `to`. Returns as
    /// soon as the transaction is broadcast; confirmation is polled
    /// separately via [`Self::get_confirmations`].
    async fn create_withdrawal(
        &self,
        to: &Address,
        amount_u: MicroUnits,
    ) -> Result<WithdrawalReceipt, GatewayError>;

    /// Confirmation depth of a previously broadcast transaction. `Ok(None)`
    /// means the transaction is not yet visible (still propagating or
    /// dropped); callers must not treat that as failure until a timeout.
    async fn get_confirmations(&self, tx_sig: &TxSignature) -> Result<Option<u32>, GatewayError>;

    /// Derives a deterministic deposit address for a given user/intent pair.
    /// The same key must always derive the same address.
    async fn generate_address(&self, key: AddressDerivationKey) -> Result<Address, GatewayError>;

    /// Chain-specific address format validation.
    fn is_valid_address(&self, address: &Address) -> bool;

    /// Builds a payment URI (e.g. BIP-21 style) for display as a QR code or
    /// deep link.
    fn build_payment_uri(&self, address: &Address, amount_u: MicroUnits) -> PaymentUri;
}
