//! Bet placement: a user locks stake against an OPEN round.

use eyre::{Result, WrapErr};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::ledger;
use crate::types::{Account, Bet, BetSide, BetStatus, NewLedgerEntry, RoundStatus};

/// Validates the round is still OPEN, checks/locks the user's cash balance,
/// and moves the stake from `cash` to `locked` (`cash -stake_u` /
/// `locked +stake_u`), all inside one transaction. The bet row and its
/// ledger legs share `ref_id = bet_id` so the pair audits as one group.
#[tracing::instrument(skip(pool))]
pub async fn place_bet(pool: &PgPool, round_id: Uuid, user_id: Uuid, side: BetSide, stake_u: i64) -> Result<Bet> {
    if stake_u <= 0 {
        return Err(EngineError::Validation("stake must be positive".into()).into());
    }

    let mut tx = pool.begin().await.wrap_err("failed to start transaction")?;

    let round_status: Option<(RoundStatus,)> = sqlx::query_as("SELECT status FROM rounds WHERE id = $1 FOR UPDATE")
        .bind(round_id)
        .fetch_optional(&mut *tx)
        .await
        .wrap_err("failed to look up round")?;
    let Some((status,)) = round_status else {
        return Err(EngineError::Validation(format!("round {round_id} does not exist")).into());
    };
    if status != RoundStatus::Open {
        return Err(EngineError::InvalidRoundState {
            round_id,
            expected: vec![RoundStatus::Open],
            found: status,
        }
        .into());
    }

    let available = ledger::balance_for_update(&mut tx, user_id, Account::Cash).await?;
    if available < stake_u {
        return Err(EngineError::InsufficientFunds {
            user_id,
            account: Account::Cash,
            requested: stake_u,
            available,
        }
        .into());
    }

    let bet_id = Uuid::new_v4();
    let entries = vec![
        NewLedgerEntry::new(Account::Cash, Some(user_id), -stake_u, "bet_placement", "bet_placement", bet_id),
        NewLedgerEntry::new(Account::Locked, Some(user_id), stake_u, "bet_placement", "bet_placement", bet_id),
    ];
    ledger::post(&mut tx, &entries).await?;

    let bet = sqlx::query_as::<_, Bet>(
        r#"
        INSERT INTO bets (id, round_id, user_id, side, stake_u, status)
        VALUES ($1, $2, $3, $4, $5, 'placed')
        RETURNING id, round_id, user_id, side, stake_u, status, created_at
        "#,
    )
    .bind(bet_id)
    .bind(round_id)
    .bind(user_id)
    .bind(side)
    .bind(stake_u)
    .fetch_one(&mut *tx)
    .await
    .wrap_err("failed to insert bet")?;

    tx.commit().await.wrap_err("failed to commit bet placement")?;
    Ok(bet)
}

/// Fetches every `Placed` bet on a round, locked for update — the set a
/// settlement or void pass must resolve before moving the round out of
/// LOCKED.
pub(crate) async fn fetch_placed_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    round_id: Uuid,
) -> Result<Vec<Bet>> {
    sqlx::query_as::<_, Bet>(
        r#"
        SELECT id, round_id, user_id, side, stake_u, status, created_at
        FROM bets
        WHERE round_id = $1 AND status = 'placed'
        FOR UPDATE
        "#,
    )
    .bind(round_id)
    .fetch_all(&mut **tx)
    .await
    .wrap_err("failed to fetch placed bets")
}

/// Applies a settlement plan's per-bet outcomes inside the caller's
/// transaction. Distinct from [`crate::ledger::post`], which only handles
/// the plan's ledger legs.
pub(crate) async fn apply_outcomes(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    outcomes: &[crate::payout::BetOutcome],
) -> Result<()> {
    for outcome in outcomes {
        sqlx::query("UPDATE bets SET status = $2 WHERE id = $1")
            .bind(outcome.bet_id)
            .bind(outcome.new_status)
            .execute(&mut **tx)
            .await
            .wrap_err("failed to update bet status")?;
    }
    Ok(())
}
