//! Integration tests requiring a live Postgres instance.
//!
//! Run with: cargo test --test integration_test -- --ignored --nocapture
//!
//! Prerequisites:
//! - Postgres running and reachable at DATABASE_URL

use std::time::Duration;
use uuid::Uuid;

mod helpers {
    use std::time::Duration;

    pub struct TestConfig {
        pub database_url: String,
    }

    impl TestConfig {
        pub fn from_env() -> Option<Self> {
            Some(TestConfig {
                database_url: std::env::var("DATABASE_URL").ok()?,
            })
        }
    }

    pub async fn check_database_connectivity(url: &str) -> bool {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
        {
            Ok(_pool) => true,
            Err(_) => false,
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_environment_setup() {
    let config = helpers::TestConfig::from_env();
    assert!(config.is_some(), "test configuration not found, set DATABASE_URL");
    let config = config.unwrap();

    assert!(
        helpers::check_database_connectivity(&config.database_url).await,
        "failed to connect to database"
    );
    println!("database OK");
}

async fn connected_pool() -> sqlx::PgPool {
    let config = helpers::TestConfig::from_env().expect("DATABASE_URL required");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

/// Replaying the same (tx_sig, log_idx) chain event must never credit a
/// user twice, even though the gateway watcher might re-observe it after a
/// reorg. Exercises the same dedup/credit queries `deposit::observe` runs,
/// against a real database.
#[tokio::test]
#[ignore]
async fn deposit_replay_is_idempotent() {
    let pool = connected_pool().await;

    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id) VALUES ($1)")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let intent_id = Uuid::new_v4();
    let address = format!("addr-{intent_id}");
    sqlx::query(
        r#"
        INSERT INTO deposit_intents (id, user_id, chain_id, address, status, expected_min_u, expires_at)
        VALUES ($1, $2, 'test-chain', $3, 'issued', 100, NOW() + INTERVAL '1 hour')
        "#,
    )
    .bind(intent_id)
    .bind(user_id)
    .bind(&address)
    .execute(&pool)
    .await
    .unwrap();

    async fn credit_once(
        pool: &sqlx::PgPool,
        address: &str,
        tx_sig: &str,
        log_idx: i32,
        amount_u: i64,
    ) -> bool {
        let mut tx = pool.begin().await.unwrap();
        let already_seen: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM chain_events WHERE tx_sig = $1 AND log_idx = $2)")
                .bind(tx_sig)
                .bind(log_idx)
                .fetch_one(&mut *tx)
                .await
                .unwrap();
        if already_seen.0 {
            tx.commit().await.unwrap();
            return false;
        }

        let (intent_id, user_id, chain_id): (Uuid, Uuid, String) = sqlx::query_as(
            "SELECT id, user_id, chain_id FROM deposit_intents WHERE address = $1 FOR UPDATE",
        )
        .bind(address)
        .fetch_one(&mut *tx)
        .await
        .unwrap();

        sqlx::query("INSERT INTO chain_events (tx_sig, log_idx, chain_id, amount_u, address) VALUES ($1, $2, $3, $4, $5)")
            .bind(tx_sig)
            .bind(log_idx)
            .bind(&chain_id)
            .bind(amount_u)
            .bind(address)
            .execute(&mut *tx)
            .await
            .unwrap();

        sqlx::query("INSERT INTO ledger_entries (account, user_id, amount_u, reason) VALUES ('cash', $1, $2, 'deposit'), ('house', NULL, $3, 'deposit')")
            .bind(user_id)
            .bind(amount_u)
            .bind(-amount_u)
            .execute(&mut *tx)
            .await
            .unwrap();

        sqlx::query("UPDATE deposit_intents SET status = 'credited', observed_amount_u = $2 WHERE id = $1")
            .bind(intent_id)
            .bind(amount_u)
            .execute(&mut *tx)
            .await
            .unwrap();

        tx.commit().await.unwrap();
        true
    }

    let first = credit_once(&pool, &address, "tx-1", 0, 150).await;
    let second = credit_once(&pool, &address, "tx-1", 0, 150).await;

    assert!(first, "first observation should credit");
    assert!(!second, "replayed observation must be a no-op");

    let (cash_total,): (Option<i64>,) =
        sqlx::query_as("SELECT SUM(amount_u) FROM ledger_entries WHERE user_id = $1 AND account = 'cash'")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(cash_total, Some(150));
}
