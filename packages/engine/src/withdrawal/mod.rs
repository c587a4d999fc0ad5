//! Withdrawal lifecycle: lock funds, submit to chain, unwind on failure,
//! confirm.

use chain_gateway::{Address, ChainGateway};
use eyre::{Result, WrapErr};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::ledger;
use crate::types::{Account, WithdrawalRequest, WithdrawalStatus};

/// Checks balance, validates the destination address, locks the funds
/// (`cash -amount` / `pending_withdrawals +amount`) and records the
/// request, all inside one transaction.
#[tracing::instrument(skip(pool, gateway))]
pub async fn create(
    pool: &PgPool,
    gateway: &dyn ChainGateway,
    user_id: Uuid,
    to: Address,
    amount_u: i64,
) -> Result<WithdrawalRequest> {
    if amount_u <= 0 {
        return Err(EngineError::Validation("withdrawal amount must be positive".into()).into());
    }
    if !gateway.is_valid_address(&to) {
        return Err(EngineError::Validation(format!("invalid destination address: {to}")).into());
    }

    let mut tx = pool.begin().await.wrap_err("failed to start transaction")?;

    let available = ledger::balance_for_update(&mut tx, user_id, Account::Cash).await?;
    if available < amount_u {
        return Err(EngineError::InsufficientFunds {
            user_id,
            account: Account::Cash,
            requested: amount_u,
            available,
        }
        .into());
    }

    let request_id = Uuid::new_v4();
    let entries = vec![
        crate::types::NewLedgerEntry::new(Account::Cash, Some(user_id), -amount_u, "withdrawal_lock", "withdrawal", request_id),
        crate::types::NewLedgerEntry::new(
            Account::PendingWithdrawals,
            Some(user_id),
            amount_u,
            "withdrawal_lock",
            "withdrawal",
            request_id,
        ),
    ];
    ledger::post(&mut tx, &entries).await?;

    let request = sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        INSERT INTO withdrawal_requests (id, user_id, to_address, amount_u, status, admin_approved, confirmations)
        VALUES ($1, $2, $3, $4, 'pending', false, 0)
        RETURNING id, user_id, to_address, amount_u, status, admin_approved, tx_sig, confirmations, created_at
        "#,
    )
    .bind(request_id)
    .bind(user_id)
    .bind(to.to_string())
    .bind(amount_u)
    .fetch_one(&mut *tx)
    .await
    .wrap_err("failed to insert withdrawal request")?;

    tx.commit().await.wrap_err("failed to commit withdrawal creation")?;
    Ok(request)
}

/// Submits an approved, pending withdrawal to the chain. A non-retryable
/// gateway error unwinds the lock (`pending_withdrawals -amount` / `cash
/// +amount`) and marks the request `Failed` — the only path that can move
/// money back out of `pending_withdrawals` without a chain confirmation.
/// A retryable error (network blip, rate limit) leaves the request exactly
/// as it was — still `Pending`, still retryable — since nothing was ever
/// actually submitted to the chain.
#[tracing::instrument(skip(pool, gateway))]
pub async fn process(pool: &PgPool, gateway: &dyn ChainGateway, request_id: Uuid) -> Result<WithdrawalRequest> {
    let request = fetch(pool, request_id).await?;
    if request.status != WithdrawalStatus::Pending {
        return Err(EngineError::Validation(format!(
            "withdrawal {request_id} is not pending (status={:?})",
            request.status
        ))
        .into());
    }
    if !request.admin_approved {
        return Err(EngineError::Validation("withdrawal is not admin-approved".into()).into());
    }

    let to = Address(request.to_address.clone());
    match gateway.create_withdrawal(&to, request.amount_u).await {
        Ok(receipt) => {
            let updated = sqlx::query_as::<_, WithdrawalRequest>(
                r#"
                UPDATE withdrawal_requests SET status = 'broadcast', tx_sig = $2
                WHERE id = $1
                RETURNING id, user_id, to_address, amount_u, status, admin_approved, tx_sig, confirmations, created_at
                "#,
            )
            .bind(request_id)
            .bind(receipt.tx_sig.to_string())
            .fetch_one(pool)
            .await
            .wrap_err("failed to mark withdrawal broadcast")?;
            Ok(updated)
        }
        Err(gateway_err) if gateway_err.retryable() => {
            tracing::warn!(
                request_id = %request_id,
                error = %gateway_err,
                "withdrawal submission failed retryably, left pending"
            );
            Ok(request)
        }
        Err(gateway_err) => {
            let mut tx = pool.begin().await.wrap_err("failed to start unwind transaction")?;
            let entries = vec![
                crate::types::NewLedgerEntry::new(
                    Account::PendingWithdrawals,
                    Some(request.user_id),
                    -request.amount_u,
                    "withdrawal_unwind",
                    "withdrawal",
                    request_id,
                ),
                crate::types::NewLedgerEntry::new(
                    Account::Cash,
                    Some(request.user_id),
                    request.amount_u,
                    "withdrawal_unwind",
                    "withdrawal",
                    request_id,
                ),
            ];
            ledger::post(&mut tx, &entries).await?;

            let updated = sqlx::query_as::<_, WithdrawalRequest>(
                r#"
                UPDATE withdrawal_requests SET status = 'failed'
                WHERE id = $1
                RETURNING id, user_id, to_address, amount_u, status, admin_approved, tx_sig, confirmations, created_at
                "#,
            )
            .bind(request_id)
            .fetch_one(&mut *tx)
            .await
            .wrap_err("failed to mark withdrawal failed")?;

            tx.commit().await.wrap_err("failed to commit withdrawal unwind")?;
            tracing::warn!(request_id = %request_id, error = %gateway_err, "withdrawal submission failed, unwound lock");
            Ok(updated)
        }
    }
}

/// Polls chain confirmation depth for broadcast withdrawals and finalizes
/// any that have reached `min_confirmations`: the locked funds leave
/// `pending_withdrawals` and flow to `house` (they are now off-ledger,
/// custody having moved on-chain).
#[tracing::instrument(skip(pool, gateway))]
pub async fn poll_confirmations(pool: &PgPool, gateway: &dyn ChainGateway, min_confirmations: u32) -> Result<u64> {
    let broadcast = sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        SELECT id, user_id, to_address, amount_u, status, admin_approved, tx_sig, confirmations, created_at
        FROM withdrawal_requests WHERE status = 'broadcast'
        "#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("failed to fetch broadcast withdrawals")?;

    let mut finalized = 0;
    for request in broadcast {
        let Some(tx_sig) = &request.tx_sig else { continue };
        let confirmations = gateway
            .get_confirmations(&chain_gateway::TxSignature(tx_sig.clone()))
            .await
            .map_err(|e| eyre::eyre!("failed to poll confirmations: {e}"))?;

        let Some(confirmations) = confirmations else { continue };
        if (confirmations as i32) < request.confirmations {
            return Err(EngineError::ConfirmationReorg(format!(
                "withdrawal {} confirmations regressed from {} to {}",
                request.id, request.confirmations, confirmations
            ))
            .into());
        }

        if confirmations >= min_confirmations {
            let mut tx = pool.begin().await.wrap_err("failed to start confirmation transaction")?;
            let entries = vec![
                crate::types::NewLedgerEntry::new(
                    Account::PendingWithdrawals,
                    Some(request.user_id),
                    -request.amount_u,
                    "withdrawal_confirmed",
                    "withdrawal",
                    request.id,
                ),
                crate::types::NewLedgerEntry::new(
                    Account::House,
                    None,
                    request.amount_u,
                    "withdrawal_confirmed",
                    "withdrawal",
                    request.id,
                ),
            ];
            ledger::post(&mut tx, &entries).await?;
            sqlx::query(r#"UPDATE withdrawal_requests SET status = 'confirmed', confirmations = $2 WHERE id = $1"#)
                .bind(request.id)
                .bind(confirmations as i32)
                .execute(&mut *tx)
                .await
                .wrap_err("failed to mark withdrawal confirmed")?;
            tx.commit().await.wrap_err("failed to commit withdrawal confirmation")?;
            finalized += 1;
        } else {
            sqlx::query(r#"UPDATE withdrawal_requests SET confirmations = $2 WHERE id = $1"#)
                .bind(request.id)
                .bind(confirmations as i32)
                .execute(pool)
                .await
                .wrap_err("failed to update withdrawal confirmation depth")?;
        }
    }

    Ok(finalized)
}

async fn fetch(pool: &PgPool, request_id: Uuid) -> Result<WithdrawalRequest> {
    sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        SELECT id, user_id, to_address, amount_u, status, admin_approved, tx_sig, confirmations, created_at
        FROM withdrawal_requests WHERE id = $1
        "#,
    )
    .bind(request_id)
    .fetch_one(pool)
    .await
    .wrap_err("withdrawal request not found")
}
