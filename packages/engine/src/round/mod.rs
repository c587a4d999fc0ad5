//! Round state machine: OPEN → LOCKED → SETTLED / CANCELLED.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use eyre::{Result, WrapErr};
use rand::RngCore;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::bet;
use crate::canonical::{canonical_json, commit_hash};
use crate::errors::EngineError;
use crate::ledger;
use crate::oracle::PriceOracle;
use crate::payout;
use crate::types::{BetSide, Round, RoundResult, RoundStatus};

/// Computes `settle_ts = start_ts + round_duration` correctly across a DST
/// transition by doing the arithmetic in the configured timezone and
/// converting back to UTC, rather than naively shifting UTC fields.
pub fn compute_settle_ts(start_ts: DateTime<Utc>, timezone: &str, duration_hours: i64) -> Result<DateTime<Utc>> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| EngineError::Configuration(format!("invalid timezone: {timezone}")))?;
    let local_start = start_ts.with_timezone(&tz);
    let local_settle = local_start + chrono::Duration::hours(duration_hours);
    Ok(local_settle.with_timezone(&Utc))
}

fn new_seed() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Creates a new round with its commit hash computed up front, matching the
/// original's `RoundScheduler.create_round`:
/// `sha256(canonical_json({code, start_ts, fee_bps, seed}))`.
#[tracing::instrument(skip(pool))]
pub async fn create_round(
    pool: &PgPool,
    code: &str,
    start_ts: DateTime<Utc>,
    fee_bps: i64,
    timezone: &str,
    round_duration_hours: i64,
    close_fetch_delay_min: i64,
) -> Result<Round> {
    let seed = new_seed();
    let settle_ts = compute_settle_ts(start_ts, timezone, round_duration_hours)?;
    let lock_ts = settle_ts - chrono::Duration::minutes(close_fetch_delay_min);

    let commit_data = json!({
        "code": code,
        "start_ts": start_ts.to_rfc3339(),
        "fee_bps": fee_bps,
        "seed": seed,
    });
    let hash = commit_hash(&commit_data);

    let round = sqlx::query_as::<_, Round>(
        r#"
        INSERT INTO rounds (id, code, status, start_ts, lock_ts, settle_ts, fee_bps, seed, commit_hash)
        VALUES ($1, $2, 'open', $3, $4, $5, $6, $7, $8)
        RETURNING id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
                  commit_hash, reveal, lock_price, settle_price, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(start_ts)
    .bind(lock_ts)
    .bind(settle_ts)
    .bind(fee_bps)
    .bind(&seed)
    .bind(&hash)
    .fetch_one(pool)
    .await
    .wrap_err("failed to insert round")?;

    Ok(round)
}

/// Transitions a round from OPEN to LOCKED, recording the oracle's price at
/// lock time for later tie-break comparison.
pub async fn lock(pool: &PgPool, round_id: Uuid, lock_price: i64) -> Result<Round> {
    let current = fetch(pool, round_id).await?;
    if current.status != RoundStatus::Open {
        return Err(EngineError::InvalidRoundState {
            round_id,
            expected: vec![RoundStatus::Open],
            found: current.status,
        }
        .into());
    }

    let round = sqlx::query_as::<_, Round>(
        r#"
        UPDATE rounds SET status = 'locked', lock_price = $2
        WHERE id = $1
        RETURNING id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
                  commit_hash, reveal, lock_price, settle_price, created_at
        "#,
    )
    .bind(round_id)
    .bind(lock_price)
    .fetch_one(pool)
    .await
    .wrap_err("failed to lock round")?;

    Ok(round)
}

/// Determines the settlement result from lock/settle prices.
/// `current > prev -> Up`, a tie (`current == prev`) resolves `Down` — this
/// is not a bug, it matches the original's `settle_round_auto` exactly.
pub fn determine_result(lock_price: i64, settle_price: i64) -> RoundResult {
    if settle_price > lock_price {
        RoundResult::Up
    } else {
        RoundResult::Down
    }
}

fn winner_side_for(result: RoundResult) -> BetSide {
    match result {
        RoundResult::Up => BetSide::Up,
        RoundResult::Down => BetSide::Down,
        RoundResult::Void => unreachable!("determine_result never returns Void"),
    }
}

fn result_str(result: RoundResult) -> &'static str {
    match result {
        RoundResult::Up => "UP",
        RoundResult::Down => "DOWN",
        RoundResult::Void => "VOID",
    }
}

/// Settles a LOCKED round against the oracle's current price: determines
/// the result against the price recorded at `lock`, builds and posts the
/// payout plan, updates every placed bet's status, and persists `reveal`
/// — all in one transaction, so a round is never left SETTLED without its
/// reveal or with bets whose ledger legs never landed.
#[tracing::instrument(skip(pool, oracle))]
pub async fn settle_auto(pool: &PgPool, oracle: &dyn PriceOracle, round_id: Uuid) -> Result<Round> {
    let mut tx = pool.begin().await.wrap_err("failed to start transaction")?;

    let round = fetch_for_update(&mut tx, round_id).await?;
    if round.status != RoundStatus::Locked {
        return Err(EngineError::InvalidRoundState {
            round_id,
            expected: vec![RoundStatus::Locked],
            found: round.status,
        }
        .into());
    }
    let lock_price = round
        .lock_price
        .ok_or_else(|| EngineError::DataIntegrity(format!("round {round_id} locked with no lock_price")))?;

    let sample = oracle
        .get_price(round.settle_ts.timestamp())
        .await
        .map_err(|e| EngineError::OracleUnavailable(e.to_string()))?;
    let settle_price = sample.price;
    let result = determine_result(lock_price, settle_price);
    let winner_side = winner_side_for(result);

    let bets = bet::fetch_placed_for_update(&mut tx, round_id).await?;
    let plan = payout::settle_round(round_id, &bets, winner_side, round.fee_bps as i64);
    ledger::post(&mut tx, &plan.entries).await?;
    bet::apply_outcomes(&mut tx, &plan.outcomes).await?;

    let reveal_data = json!({
        "date": round.code,
        "prev_price": lock_price,
        "current_price": settle_price,
        "result": result_str(result),
    });
    let reveal = canonical_json(&reveal_data);

    let updated = sqlx::query_as::<_, Round>(
        r#"
        UPDATE rounds SET status = 'settled', result = $2, settle_price = $3, reveal = $4
        WHERE id = $1
        RETURNING id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
                  commit_hash, reveal, lock_price, settle_price, created_at
        "#,
    )
    .bind(round_id)
    .bind(result)
    .bind(settle_price)
    .bind(&reveal)
    .fetch_one(&mut *tx)
    .await
    .wrap_err("failed to mark round settled")?;

    tx.commit().await.wrap_err("failed to commit round settlement")?;
    Ok(updated)
}

/// Settles a LOCKED round as VOID (oracle outage past grace window):
/// refunds every placed bet's stake with no fee and lands the round in
/// SETTLED, not CANCELLED — CANCELLED is reserved for an OPEN round
/// withdrawn before any bet could be locked against it.
#[tracing::instrument(skip(pool))]
pub async fn settle_grace_elapsed(pool: &PgPool, round_id: Uuid) -> Result<Round> {
    let mut tx = pool.begin().await.wrap_err("failed to start transaction")?;

    let round = fetch_for_update(&mut tx, round_id).await?;
    if round.status != RoundStatus::Locked {
        return Err(EngineError::InvalidRoundState {
            round_id,
            expected: vec![RoundStatus::Locked],
            found: round.status,
        }
        .into());
    }

    let bets = bet::fetch_placed_for_update(&mut tx, round_id).await?;
    let plan = payout::void_round(round_id, &bets);
    ledger::post(&mut tx, &plan.entries).await?;
    bet::apply_outcomes(&mut tx, &plan.outcomes).await?;

    let reveal_data = json!({
        "date": round.code,
        "prev_price": round.lock_price,
        "current_price": serde_json::Value::Null,
        "result": result_str(RoundResult::Void),
    });
    let reveal = canonical_json(&reveal_data);

    let updated = sqlx::query_as::<_, Round>(
        r#"
        UPDATE rounds SET status = 'settled', result = 'void', reveal = $2
        WHERE id = $1
        RETURNING id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
                  commit_hash, reveal, lock_price, settle_price, created_at
        "#,
    )
    .bind(round_id)
    .bind(&reveal)
    .fetch_one(&mut *tx)
    .await
    .wrap_err("failed to mark round void")?;

    tx.commit().await.wrap_err("failed to commit round void settlement")?;
    Ok(updated)
}

async fn fetch(pool: &PgPool, round_id: Uuid) -> Result<Round> {
    sqlx::query_as::<_, Round>(
        r#"
        SELECT id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
               commit_hash, reveal, lock_price, settle_price, created_at
        FROM rounds WHERE id = $1
        "#,
    )
    .bind(round_id)
    .fetch_one(pool)
    .await
    .wrap_err("round not found")
}

async fn fetch_for_update(tx: &mut Transaction<'_, Postgres>, round_id: Uuid) -> Result<Round> {
    sqlx::query_as::<_, Round>(
        r#"
        SELECT id, code, status, result, start_ts, lock_ts, settle_ts, fee_bps, seed,
               commit_hash, reveal, lock_price, settle_price, created_at
        FROM rounds WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(round_id)
    .fetch_one(&mut **tx)
    .await
    .wrap_err("round not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use chrono::TimeZone as _;
    use chrono::Timelike;

    #[test]
    fn tie_resolves_down() {
        assert_eq!(determine_result(100, 100), RoundResult::Down);
    }

    #[test]
    fn higher_settle_price_resolves_up() {
        assert_eq!(determine_result(100, 101), RoundResult::Up);
    }

    #[test]
    fn lower_settle_price_resolves_down() {
        assert_eq!(determine_result(100, 99), RoundResult::Down);
    }

    #[test]
    fn winner_side_matches_result() {
        assert_eq!(winner_side_for(RoundResult::Up), BetSide::Up);
        assert_eq!(winner_side_for(RoundResult::Down), BetSide::Down);
    }

    #[test]
    fn result_str_matches_glossary_casing() {
        assert_eq!(result_str(RoundResult::Up), "UP");
        assert_eq!(result_str(RoundResult::Down), "DOWN");
        assert_eq!(result_str(RoundResult::Void), "VOID");
    }

    #[test]
    fn settle_ts_crosses_dst_correctly() {
        // 2026-03-07 12:00 America/New_York is before the spring-forward
        // DST transition (2026-03-08); +24h must still land at 12:00 local
        // the next day, which is 23 real hours later in UTC terms.
        let start = Utc.with_ymd_and_hms(2026, 3, 7, 17, 0, 0).unwrap(); // 12:00 EST
        let settle = compute_settle_ts(start, "America/New_York", 24).unwrap();
        let settle_local = settle.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(settle_local.hour(), 12);
        assert_eq!(settle_local.day(), 8);
    }
}
