use anyhow::Context;
use infra_early_warning::{
    api::{build_router, AppState},
    config::Config,
    ml::RiskService,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before logging so the fallback filter can come from it
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "infra_early_warning={level},tower_http={level}",
            level = config.observability.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Starting {} v{}",
        config.observability.service_name,
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = infra_early_warning::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    // Train every configured model before accepting traffic
    let service = Arc::new(RiskService::from_config(&config)?);
    let assets = service.configured_assets();
    if assets.is_empty() {
        anyhow::bail!("No datasets enabled; nothing to serve");
    }

    let trainer = service.clone();
    tokio::task::spawn_blocking(move || trainer.train_all())
        .await
        .context("Training task panicked")?
        .context("Initial training failed")?;

    for asset in &assets {
        let model = service.model(*asset)?;
        let meta = model.metadata();
        tracing::info!(
            "✅ {} model {} trained on {} rows (training accuracy {:.3})",
            asset.description(),
            meta.model_id,
            meta.n_training_samples,
            meta.training_metrics.accuracy
        );
    }

    let app = build_router(AppState::new(service)).layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Models: http://{}/v1/models", http_addr);
    tracing::info!("   Predict: POST http://{}/v1/predict/{{bridge|water}}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
