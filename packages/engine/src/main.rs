mod bet;
mod bounded_cache;
mod canonical;
mod config;
mod confirmation_monitor;
mod db;
mod deposit;
mod errors;
mod ledger;
mod metrics;
mod oracle;
mod payout;
mod reconciler;
mod retry;
mod round;
mod scheduler;
mod types;
mod withdrawal;

use std::time::Duration;

use config::Config;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("starting settlement engine");

    let config = Config::load()?;
    tracing::info!(timezone = %config.round.timezone, fee_bps = config.round.fee_bps, "configuration loaded");

    let db = db::create_pool(&config.database.url).await?;
    tracing::info!("database connected");

    db::run_migrations(&db).await?;
    tracing::info!("database migrations complete");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    tracing::info!("running deposit expiry and ledger reconciliation sweeps");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutdown signal received, stopping sweeps");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {
                if let Err(e) = run_sweep(&db).await {
                    tracing::error!(error = %e, "sweep failed");
                }
            }
        }
    }

    tracing::info!("settlement engine stopped");
    Ok(())
}

/// One pass of the housekeeping work that doesn't depend on a concrete
/// `ChainGateway`/`PriceOracle` implementation: expiring stale deposit
/// intents and auditing the ledger for drift. Round locking/settlement,
/// chain polling, and the gateway-diffing half of reconciliation
/// (`reconciler::audit_chain`) all need a concrete gateway/oracle wired in
/// by the operator, so they run as library calls from that wiring, not
/// from this loop.
async fn run_sweep(db: &sqlx::PgPool) -> eyre::Result<()> {
    let expired = deposit::expire_old(db, chrono::Utc::now()).await?;
    if expired > 0 {
        tracing::info!(expired, "expired stale deposit intents");
    }

    let report = reconciler::audit_ledger(db).await?;
    if !report.is_clean() {
        tracing::error!(
            grand_total_u = report.grand_total_u,
            negative_accounts = report.negative_user_accounts.len(),
            unbalanced_groups = report.unbalanced_groups.len(),
            locked_mismatches = report.locked_mismatches.len(),
            "ledger audit found a discrepancy"
        );
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,settlement_engine=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received ctrl+c, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received sigterm, initiating shutdown");
        }
    }
}
