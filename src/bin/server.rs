use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use skymmich::config::{CliArgs, Config, get_config};
use skymmich::services::plate_solver::PlateSolveWorker;
use skymmich::services::sync::{SyncError, run_sync};
use skymmich::{AppState, create_app, db, run_migrations};

/// Sets up stderr logging plus a daily rolling JSON file when `log_dir` is set
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(config: &Config, debug: bool) -> Option<WorkerGuard> {
    let default_filter = if debug {
        "skymmich=debug,tower_http=debug"
    } else {
        "skymmich=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "skymmich.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().json().with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Runs a library sync every `sync_interval` until the process exits
fn spawn_periodic_sync(state: AppState) -> Option<JoinHandle<()>> {
    let period = state.config.sync_interval()?;
    info!("Syncing with Immich every {:?}", period);

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; wait a full period before syncing
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match run_sync(&state).await {
                Ok(report) => info!(
                    "Scheduled sync finished: {} scanned, {} created, {} updated, {} removed",
                    report.scanned, report.created, report.updated, report.removed
                ),
                Err(SyncError::AlreadyRunning) => info!("Skipping scheduled sync, one is already running"),
                Err(SyncError::Immich(e)) => warn!("Scheduled sync failed: {}", e),
                Err(e) => error!("Scheduled sync failed: {}", e),
            }
        }
    }))
}

/// Resolves when the process receives Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if dotenv::dotenv().is_ok() {
        println!("Loaded .env file");
    }

    let args = CliArgs::parse();
    let debug = args.debug;
    let config = get_config(args);
    let _log_guard = init_tracing(&config, debug);

    info!(
        "Starting Skymmich v{} (database: {})",
        env!("CARGO_PKG_VERSION"),
        config.database_url
    );

    let pool = db::init_pool(&config.database_url).context("Failed to open database")?;
    {
        let mut conn = pool.get().context("Failed to get database connection")?;
        run_migrations(&mut conn)?;
    }

    let listen_addr = config.listen_addr;
    let state = AppState::new(Arc::new(pool), config);

    let worker = PlateSolveWorker::new(state.clone()).spawn();
    let sync_task = spawn_periodic_sync(state.clone());

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening on http://{}", listen_addr);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    worker.abort();
    if let Some(task) = sync_task {
        task.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}
