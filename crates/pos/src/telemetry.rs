//! Tracing and metrics installation.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::{PosError, Result};

/// Installs the global tracing subscriber. `RUST_LOG` syntax errors fall
/// back to `info`.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.map_err(|e| PosError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder. With `METRICS_ADDR` set, also serves
/// the scrape endpoint there; otherwise metrics are only rendered on demand
/// through the returned handle.
pub fn init_metrics(config: &Config) -> Result<Option<PrometheusHandle>> {
    match config.metrics_addr {
        Some(addr) => {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| PosError::Telemetry(e.to_string()))?;
            tracing::info!(%addr, "serving Prometheus metrics");
            Ok(None)
        }
        None => PrometheusBuilder::new()
            .install_recorder()
            .map(Some)
            .map_err(|e| PosError::Telemetry(e.to_string())),
    }
}
