//! Switchboard - Main Entry Point
//! JSON-RPC 2.0 batch endpoint with trace/logging/metrics middleware

mod config;
mod demo;
mod hooks;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter, Registry};

// Import workspace crates
use switchboard_api_rpc::{Dispatcher, FrontDoor, RpcServer};
use switchboard_core::application::Instrumentation;
use switchboard_infra_telemetry::{MetricsRegistry, TracingLogSink, TracingTracer};

use crate::config::{DaemonConfig, LogFormat};
use crate::hooks::RequestIdHook;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "switchboard=info";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON format via SWITCHBOARD_LOG_FORMAT=json)
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    // 1.1. OpenTelemetry export layer (optional)
    let (otel_layer, telemetry_status) = telemetry::layer::<Layered<EnvFilter, Registry>>();
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match LogFormat::from_env() {
        LogFormat::Json => {
            // Production: JSON structured logging
            subscriber.with(fmt::layer().json()).init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            subscriber.with(fmt::layer().pretty()).init();
        }
    }

    info!("Switchboard v{} starting...", VERSION);
    telemetry_status.report();

    // 2. Load configuration
    let config = DaemonConfig::from_env();
    info!(?config, "Configuration loaded");

    // 3. Instrumentation sinks (constructed once, shared by every service)
    let metrics = Arc::new(MetricsRegistry::new());
    let instrumentation = Instrumentation::new(
        Arc::new(TracingTracer::new()),
        metrics.clone(),
        Arc::new(TracingLogSink::new()),
    );

    // 4. Register services
    let dispatcher = Dispatcher::builder(instrumentation)
        .max_concurrency(config.batch_concurrency)
        .register_router(demo::router().context("Demo service definition is invalid")?)
        .context("Service registration failed")?
        .build();
    info!(methods = ?dispatcher.methods(), "Services registered");

    // 5. Start JSON-RPC server
    let front_door = FrontDoor::new(dispatcher).before(RequestIdHook);
    let rpc_handle = RpcServer::new(config.server(), front_door)
        .with_metrics(move || metrics.render())
        .start()
        .await
        .context("RPC server start failed")?;

    info!(addr = %rpc_handle.local_addr(), "System ready. Waiting for calls...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    rpc_handle
        .stop()
        .await
        .context("RPC server stop failed")?;

    info!("Shutdown complete.");

    Ok(())
}
