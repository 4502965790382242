//! POS service entry point.

use std::process::ExitCode;
use std::time::Duration;

use domain::TableStatus;
use event_store::{InMemoryEventStore, Persistence, PostgresEventStore};
use pos::{Config, Pos, PosError, Seed, telemetry};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;

const VIEW_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

async fn serve<S: Persistence + Clone + 'static>(store: S, config: &Config) -> Result<(), PosError> {
    let pos = Pos::from_config(store, config);

    if let Some(path) = &config.seed_file {
        pos.seed(Seed::from_path(path).await?).await?;
    }

    let events = pos.refresh_views().await?;
    let counts = pos.floor_plan().status_counts().await;
    tracing::info!(
        events,
        available = counts[0].1,
        occupied = counts[1].1,
        reserved = counts[2].1,
        "pos ready"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut refresh = tokio::time::interval(VIEW_REFRESH_INTERVAL);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = refresh.tick() => {
                if let Err(e) = pos.refresh_views().await {
                    tracing::warn!(error = %e, "view refresh failed");
                }
            }
        }
    }

    let occupied = pos.floor_plan().with_status(TableStatus::Occupied).await.len();
    tracing::info!(occupied, "pos stopped");
    Ok(())
}

async fn run(config: Config) -> Result<(), PosError> {
    let _metrics = telemetry::init_metrics(&config)?;

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresEventStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL event store");
            serve(store, &config).await
        }
        None => {
            tracing::info!("using in-memory event store");
            serve(InMemoryEventStore::new(), &config).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pos: {e}");
            return ExitCode::from(PosError::from(e).exit_code());
        }
    };

    if let Err(e) = telemetry::init_tracing(&config) {
        eprintln!("pos: {e}");
        return ExitCode::from(e.exit_code());
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = ?e.kind(), "pos failed");
            ExitCode::from(e.exit_code())
        }
    }
}
