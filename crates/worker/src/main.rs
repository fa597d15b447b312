use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secinv_db::PgAnalyzerStatusStore;
use secinv_pipeline::{StatusContext, TracingErrorTracker};
use secinv_worker::{EventDispatcher, LogFormat, OutboxPoller, SettingsSweep, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long each background task gets to finish after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "secinv_worker=debug,secinv_pipeline=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!(
        db_max_connections = config.db_max_connections,
        enabled_roots = ?config.enabled_roots,
        sweep_interval_secs = config.sweep_interval.map(|d| d.as_secs()),
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = secinv_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    secinv_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    secinv_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Status context ---
    let ctx = StatusContext::from_backend(
        Arc::new(PgAnalyzerStatusStore::new(pool.clone())),
        Arc::new(config.enabled_roots.clone()),
        Arc::new(TracingErrorTracker),
    );

    let cancel = CancellationToken::new();

    // Spawn outbox poller (dispatches persisted analyzer events).
    let poller = OutboxPoller::new(
        pool.clone(),
        EventDispatcher::new(ctx.clone()),
        config.outbox_batch_size,
        config.outbox_max_attempts,
        config.outbox_poll_interval,
    );
    let poller_cancel = cancel.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(poller_cancel).await;
    });

    // Spawn settings sweep unless disabled.
    let sweep_handle = config.sweep_interval.map(|period| {
        let sweep = SettingsSweep::new(ctx.clone(), period);
        let sweep_cancel = cancel.clone();
        tokio::spawn(async move {
            sweep.run(sweep_cancel).await;
        })
    });

    tracing::info!(
        sweep_enabled = sweep_handle.is_some(),
        "Worker started"
    );

    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, poller_handle).await;
    tracing::info!("Outbox poller stopped");

    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        tracing::info!("Settings sweep stopped");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
