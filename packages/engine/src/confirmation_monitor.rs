//! Periodic poll over in-flight deposits and withdrawals: detects stuck
//! transfers and confirmation-depth regressions (possible reorgs), alerting
//! at most once per subject within a dedup window.

use std::time::Duration;

use chain_gateway::ChainGateway;
use chrono::Utc;
use eyre::{Result, WrapErr};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::bounded_cache::DedupCache;
use crate::types::DepositIntent;

const ALERT_DEDUP_WINDOW: Duration = Duration::from_secs(300);
const ALERT_DEDUP_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AlertKind {
    DepositStuck,
    WithdrawalStuck,
}

pub struct ConfirmationMonitor {
    alerts: DedupCache<(Uuid, AlertKind)>,
}

impl ConfirmationMonitor {
    pub fn new() -> Self {
        Self {
            alerts: DedupCache::new(ALERT_DEDUP_CAPACITY, ALERT_DEDUP_WINDOW),
        }
    }

    /// Flags deposit intents stuck in `Seen` longer than `max_pending_hours`
    /// without reaching `Credited` — they haven't expired yet (that's
    /// `deposit::expire_old`'s job) but are suspiciously slow to confirm.
    #[tracing::instrument(skip(self, pool))]
    pub async fn check_stuck_deposits(&mut self, pool: &PgPool, max_pending_hours: i64) -> Result<u64> {
        let stuck: Vec<DepositIntent> = sqlx::query_as(
            r#"
            SELECT id, user_id, chain_id, address, status, expected_min_u, observed_amount_u,
                   tx_sig, log_idx, created_at, expires_at
            FROM deposit_intents
            WHERE status = 'seen' AND created_at < $1
            "#,
        )
        .bind(Utc::now() - chrono::Duration::hours(max_pending_hours))
        .fetch_all(pool)
        .await
        .wrap_err("failed to scan for stuck deposit intents")?;

        let mut alerted = 0;
        for intent in &stuck {
            if self.alerts.should_alert((intent.id, AlertKind::DepositStuck)) {
                warn!(intent_id = %intent.id, user_id = %intent.user_id, "deposit intent stuck in seen state");
                alerted += 1;
            }
        }
        Ok(alerted)
    }

    /// Polls a single broadcast withdrawal's confirmation depth against the
    /// chain and alerts (deduped) if it has been stuck below
    /// `min_confirmations` past a reasonable window, or if the depth
    /// regressed (handled upstream in `withdrawal::poll_confirmations`,
    /// which already turns a regression into `EngineError::ConfirmationReorg`
    /// rather than a mere alert).
    #[tracing::instrument(skip(self, gateway))]
    pub async fn check_withdrawal_stuck(
        &mut self,
        gateway: &dyn ChainGateway,
        request_id: Uuid,
        tx_sig: &chain_gateway::TxSignature,
        min_confirmations: u32,
        submitted_hours_ago: i64,
    ) -> Result<bool> {
        if submitted_hours_ago < 1 {
            return Ok(false);
        }
        let confirmations = gateway
            .get_confirmations(tx_sig)
            .await
            .map_err(|e| eyre::eyre!("failed to poll confirmations: {e}"))?
            .unwrap_or(0);

        if confirmations < min_confirmations && self.alerts.should_alert((request_id, AlertKind::WithdrawalStuck)) {
            warn!(request_id = %request_id, %confirmations, min_confirmations, "withdrawal stuck below required confirmations");
            return Ok(true);
        }
        Ok(false)
    }
}

impl Default for ConfirmationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_alert_within_window_is_suppressed() {
        let mut monitor = ConfirmationMonitor::new();
        let id = Uuid::new_v4();
        assert!(monitor.alerts.should_alert((id, AlertKind::DepositStuck)));
        assert!(!monitor.alerts.should_alert((id, AlertKind::DepositStuck)));
    }

    #[test]
    fn distinct_kinds_alert_independently() {
        let mut monitor = ConfirmationMonitor::new();
        let id = Uuid::new_v4();
        assert!(monitor.alerts.should_alert((id, AlertKind::DepositStuck)));
        assert!(monitor.alerts.should_alert((id, AlertKind::WithdrawalStuck)));
    }
}
