use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api::HttpClient;
use common::config::Config;
use validators::Poller;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

#[derive(Clone)]
struct AppState {
    registry: Registry,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config
    let config = Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.global.logging)),
        )
        .init();

    info!("Config loaded from: {}", args.config);
    info!("Watching {} validators", config.validators.len());

    // One registry per process, shared between the poller and the
    // scrape endpoint.
    let namespace = config.global.namespace.clone();
    let const_labels: HashMap<String, String> = config.global.labels.clone().into_iter().collect();
    let registry = Registry::new_custom(
        (!namespace.is_empty()).then_some(namespace),
        (!const_labels.is_empty()).then_some(const_labels),
    )?;

    let beaconchain = Arc::new(HttpClient::new(&config.api, &registry)?);

    let poller = Poller::new(
        &config.validators,
        config.global.check_interval(),
        beaconchain,
        &registry,
    )?;

    // Start polling
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    let state = AppState { registry };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(state);

    let listener = TcpListener::bind(&config.global.metrics_addr).await?;
    info!("Serving metrics at {}", config.global.metrics_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_handle.await {
        error!("Poller task failed: {}", e);
    }

    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Metrics output is not valid UTF-8: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
