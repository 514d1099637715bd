//! Fraud Inference Service - Main Entry Point
//!
//! Loads the pre-trained classifier once at startup and serves manual and
//! batch scoring requests over HTTP.

use anyhow::{Context, Result};
use fraud_inference_service::{
    config::AppConfig,
    metrics::{MetricsReporter, ServiceMetrics},
    models::inference::InferenceEngine,
    server::{self, AppState},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration is read before logging init so the subscriber can
    // honor the configured level and format.
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_logging(&config);

    info!("Starting Fraud Inference Service");
    if let Some(e) = config_error {
        warn!(error = %e, "Could not load config/config.toml, using defaults");
    }
    info!(
        model = %config.model.path,
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // A missing or invalid artifact is fatal. The service must not start
    // without a usable model.
    let engine = Arc::new(
        InferenceEngine::new(&config).context("fatal: classifier artifact could not be loaded")?,
    );
    info!("Inference engine initialized");

    let metrics = Arc::new(ServiceMetrics::new());

    // Start metrics reporter (prints summary every 60 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 60);
        reporter.start().await;
    });

    let state = AppState { engine, metrics };
    let app = server::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "fraud_inference_service={},tower_http=info",
            config.logging.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
