//! Core domain types: users, ledger entries, rounds, bets, transfers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type MicroUnits = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "account_kind", rename_all = "snake_case")]
pub enum Account {
    Cash,
    Locked,
    PendingWithdrawals,
    House,
    Fees,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub risk_score: i32,
    pub created_at: DateTime<Utc>,
}

/// `ref_type`/`ref_id` group every entry produced by a single logical event
/// (a bet placement, a round settlement, a deposit credit, a withdrawal
/// lock/unwind/confirmation, a reconciliation correction). Invariant L1:
/// for every `(ref_type, ref_id)` group, Σ `amount_u` = 0.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account: Account,
    pub user_id: Option<Uuid>,
    pub amount_u: MicroUnits,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single leg of a ledger posting, before it is assigned an id.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub account: Account,
    pub user_id: Option<Uuid>,
    pub amount_u: MicroUnits,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: Uuid,
}

impl NewLedgerEntry {
    pub fn new(
        account: Account,
        user_id: Option<Uuid>,
        amount_u: MicroUnits,
        reason: impl Into<String>,
        ref_type: impl Into<String>,
        ref_id: Uuid,
    ) -> Self {
        Self {
            account,
            user_id,
            amount_u,
            reason: reason.into(),
            ref_type: ref_type.into(),
            ref_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "round_status", rename_all = "snake_case")]
pub enum RoundStatus {
    Open,
    Locked,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "round_result", rename_all = "snake_case")]
pub enum RoundResult {
    Up,
    Down,
    Void,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    /// YYYYMMDD, unique.
    pub code: String,
    pub status: RoundStatus,
    pub result: Option<RoundResult>,
    pub start_ts: DateTime<Utc>,
    pub lock_ts: DateTime<Utc>,
    pub settle_ts: DateTime<Utc>,
    pub fee_bps: i32,
    pub seed: String,
    pub commit_hash: String,
    pub reveal: Option<String>,
    pub lock_price: Option<i64>,
    pub settle_price: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "bet_side", rename_all = "snake_case")]
pub enum BetSide {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "bet_status", rename_all = "snake_case")]
pub enum BetStatus {
    Placed,
    Won,
    Lost,
    Refunded,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub round_id: Uuid,
    pub user_id: Uuid,
    pub side: BetSide,
    pub stake_u: MicroUnits,
    pub status: BetStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "transfer_type", rename_all = "snake_case")]
pub enum TransferType {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub amount_u: MicroUnits,
    pub tx_sig: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "deposit_intent_status", rename_all = "snake_case")]
pub enum DepositIntentStatus {
    Issued,
    Seen,
    Confirmed,
    Credited,
    Expired,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DepositIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain_id: String,
    pub address: String,
    pub status: DepositIntentStatus,
    pub expected_min_u: MicroUnits,
    pub observed_amount_u: Option<MicroUnits>,
    pub tx_sig: Option<String>,
    pub log_idx: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "withdrawal_status", rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Broadcast,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub to_address: String,
    pub amount_u: MicroUnits,
    pub status: WithdrawalStatus,
    pub admin_approved: bool,
    pub tx_sig: Option<String>,
    pub confirmations: i32,
    pub created_at: DateTime<Utc>,
}

/// Dedup record for an inbound chain event; `(tx_sig, log_idx)` is unique.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChainEvent {
    pub id: i64,
    pub tx_sig: String,
    pub log_idx: i32,
    pub chain_id: String,
    pub amount_u: MicroUnits,
    pub address: String,
    pub created_at: DateTime<Utc>,
}
