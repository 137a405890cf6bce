//! Datahub - metrics, prediction and recommendation query service
//!
//! This binary fronts the cluster metrics backend and the prediction store,
//! consolidating per-entity series behind one JSON API.

use anyhow::Result;
use datahub::{
    api,
    config::{DatahubConfig, LogFormat},
};
use datahub_lib::{
    health::{components, HealthRegistry},
    observability::{DatahubMetrics, StructuredLogger},
    source::{InfluxDbClient, PrometheusClient},
    DaosBuilder,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DATAHUB_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DatahubConfig::load()?;
    init_tracing(config.log_format);

    info!("Starting datahub");
    info!(
        prometheus = %config.prometheus.url,
        influxdb = %config.influxdb.address,
        cancel_on_error = config.collector.cancel_on_error,
        "Datahub configured"
    );

    let logger = StructuredLogger::new("datahub");

    let backend = PrometheusClient::new(&config.prometheus)?;
    let store = InfluxDbClient::new(&config.influxdb)?;
    let daos = DaosBuilder::new()
        .backend(Arc::new(backend))
        .store(Arc::new(store))
        .config(config.collector.clone())
        .logger(logger.clone())
        .build()?;

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::TIMESERIES_STORE).await;

    let metrics = DatahubMetrics::new()?;

    let app_state = Arc::new(api::AppState::new(
        daos,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(DATAHUB_VERSION, config.api_port);

    api::serve(config.api_port, app_state, shutdown_signal()).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
