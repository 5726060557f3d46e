//! Dynamic gateway binary.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                      GATEWAY                          │
//!   Client Request │  ┌──────────┐   ┌──────────┐   ┌──────────────┐      │
//!   ───────────────┼─▶│ request  │──▶│ capture  │──▶│ proxy handler│──────┼──▶ Route target
//!                  │  │   id     │   │  + log   │   │ (route table)│      │
//!                  │  └──────────┘   └──────────┘   └──────▲───────┘      │
//!                  │                                       │              │
//!                  │  ┌──────────────┐   ┌───────────────┐ │              │
//!   Route source ──┼─▶│ file watcher │──▶│  reconciler   │─┘              │
//!                  │  └──────────────┘   └───────────────┘                │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use dynamic_gateway::config::{load_config, FileRouteSource, GatewayConfig, RouteSourceKey};
use dynamic_gateway::lifecycle::{wait_for_shutdown_signal, GatewayContext, Shutdown};
use dynamic_gateway::observability::{logging, metrics, TracingLogSink};

#[derive(Parser, Debug)]
#[command(name = "dynamic-gateway", version, about = "HTTP gateway with dynamic routes")]
struct Args {
    /// Path to the TOML settings file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dynamic-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        application = %config.application_name,
        capture_enabled = config.capture.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let ctx = GatewayContext::new(config.clone());

    let key = RouteSourceKey::for_application(&config.application_name, &config.route_source.group);
    let source = FileRouteSource::new(
        &config.route_source.directory,
        key,
        Duration::from_secs(config.route_source.poll_interval_secs),
    );
    let subscription = match ctx.bootstrap(&source, &shutdown).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            tracing::warn!(path = ?source.path(), error = %e, "Route source subscription failed, routes will not update");
            None
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_shutdown.trigger();
    });

    let server = ctx.http_server(Arc::new(TracingLogSink));
    server.run(listener, shutdown.subscribe()).await?;

    if let Some(subscription) = subscription {
        subscription.cancel();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
