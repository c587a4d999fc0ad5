//! Scheduler driver: pure "is it time to act on this round" decisions. No
//! cron/async-scheduler wiring lives here — a caller's own loop or cron job
//! polls these and invokes the round engine.

use chrono::{DateTime, Utc};

use crate::types::{Round, RoundStatus};

pub fn due_for_lock(round: &Round, now: DateTime<Utc>) -> bool {
    round.status == RoundStatus::Open && now >= round.lock_ts
}

pub fn due_for_settle(round: &Round, now: DateTime<Utc>) -> bool {
    round.status == RoundStatus::Locked && now >= round.settle_ts
}

/// True once the oracle has been unavailable past the round's grace window
/// and the round must be forced to VOID rather than settled.
pub fn due_for_grace_void(round: &Round, now: DateTime<Utc>, settle_grace_min: i64) -> bool {
    round.status == RoundStatus::Locked
        && now >= round.settle_ts + chrono::Duration::minutes(settle_grace_min)
}
