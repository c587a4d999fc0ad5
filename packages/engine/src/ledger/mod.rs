//! Double-entry ledger. Every account balance in the system is derived from
//! this table; nothing else holds balance state.

use eyre::{Result, WrapErr};
use sqlx::Postgres;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::types::{Account, LedgerEntry, NewLedgerEntry};

/// Posts a balanced set of ledger entries inside the caller's transaction.
/// Rejects with [`EngineError::LedgerImbalance`] unless the amounts sum to
/// zero — this is the single place that invariant is enforced.
#[tracing::instrument(skip(tx, entries), fields(count = entries.len()))]
pub async fn post(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entries: &[NewLedgerEntry],
) -> Result<Vec<LedgerEntry>> {
    let sum: i64 = entries.iter().map(|e| e.amount_u).sum();
    if sum != 0 {
        return Err(EngineError::LedgerImbalance { sum_u: sum }.into());
    }

    let mut posted = Vec::with_capacity(entries.len());
    for entry in entries {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (account, user_id, amount_u, reason, ref_type, ref_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, account, user_id, amount_u, reason, ref_type, ref_id, created_at
            "#,
        )
        .bind(entry.account)
        .bind(entry.user_id)
        .bind(entry.amount_u)
        .bind(&entry.reason)
        .bind(&entry.ref_type)
        .bind(entry.ref_id)
        .fetch_one(&mut **tx)
        .await
        .wrap_err("failed to insert ledger entry")?;
        posted.push(row);
    }

    Ok(posted)
}

/// Current balance of `user_id`'s `account`, locked for update within the
/// caller's transaction so a concurrent withdrawal/bet can't race past a
/// balance check.
pub async fn balance_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: Uuid,
    account: Account,
) -> Result<i64> {
    let row: (Option<i64>,) = sqlx::query_as(
        r#"
        SELECT SUM(amount_u) FROM ledger_entries
        WHERE user_id = $1 AND account = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(account)
    .fetch_one(&mut **tx)
    .await
    .wrap_err("failed to read balance for update")?;
    Ok(row.0.unwrap_or(0))
}

/// Current balance without locking — for read-only display/metrics paths.
pub async fn balance(pool: &sqlx::PgPool, user_id: Uuid, account: Account) -> Result<i64> {
    let row: (Option<i64>,) = sqlx::query_as(
        r#"SELECT SUM(amount_u) FROM ledger_entries WHERE user_id = $1 AND account = $2"#,
    )
    .bind(user_id)
    .bind(account)
    .fetch_one(pool)
    .await
    .wrap_err("failed to read balance")?;
    Ok(row.0.unwrap_or(0))
}

/// System-wide total for an account not scoped to a user (`house`, `fees`),
/// or the aggregate across all users for a user-scoped account.
pub async fn total(pool: &sqlx::PgPool, account: Account) -> Result<i64> {
    let row: (Option<i64>,) =
        sqlx::query_as(r#"SELECT SUM(amount_u) FROM ledger_entries WHERE account = $1"#)
            .bind(account)
            .fetch_one(pool)
            .await
            .wrap_err("failed to read account total")?;
    Ok(row.0.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewLedgerEntry;

    fn imbalance_sum(entries: &[NewLedgerEntry]) -> i64 {
        entries.iter().map(|e| e.amount_u).sum()
    }

    #[test]
    fn detects_nonzero_sum() {
        let user = Uuid::new_v4();
        let ref_id = Uuid::new_v4();
        let entries = vec![
            NewLedgerEntry::new(Account::Cash, Some(user), 100, "deposit", "deposit_intent", ref_id),
            NewLedgerEntry::new(Account::House, None, -50, "deposit", "deposit_intent", ref_id),
        ];
        assert_ne!(imbalance_sum(&entries), 0);
    }

    #[test]
    fn balanced_entries_sum_to_zero() {
        let user = Uuid::new_v4();
        let ref_id = Uuid::new_v4();
        let entries = vec![
            NewLedgerEntry::new(Account::Cash, Some(user), 100, "deposit", "deposit_intent", ref_id),
            NewLedgerEntry::new(Account::House, None, -100, "deposit", "deposit_intent", ref_id),
        ];
        assert_eq!(imbalance_sum(&entries), 0);
    }
}
