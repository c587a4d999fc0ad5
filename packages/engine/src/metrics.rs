//! Aggregate ledger metrics: total value locked and its components.
//! Recomputed from the ledger on every call — never cached, since a cached
//! figure could mask a reconciliation break between two calls.

use eyre::Result;
use sqlx::PgPool;

use crate::types::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TvlReport {
    pub total_cash_u: i64,
    pub total_locked_u: i64,
    pub total_pending_withdrawals_u: i64,
    pub tvl_u: i64,
}

#[tracing::instrument(skip(pool))]
pub async fn tvl(pool: &PgPool) -> Result<TvlReport> {
    let total_cash_u = crate::ledger::total(pool, Account::Cash).await?;
    let total_locked_u = crate::ledger::total(pool, Account::Locked).await?;
    let total_pending_withdrawals_u = crate::ledger::total(pool, Account::PendingWithdrawals).await?;

    Ok(TvlReport {
        total_cash_u,
        total_locked_u,
        total_pending_withdrawals_u,
        tvl_u: total_cash_u + total_locked_u + total_pending_withdrawals_u,
    })
}
