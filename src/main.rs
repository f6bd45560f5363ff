// Main entry point for the image classification demo

use image_classifier::{
    api::{build_router, AppState, ENDPOINTS},
    core::Config,
    middleware::{CircuitBreaker, CircuitBreakerConfig},
    orchestration::Analyzer,
    services::{build_classifier, GoogleTranslator, LabelTranslator},
    utils::Metrics,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let level = match config.log_level() {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    };
    let filter = EnvFilter::new(format!(
        "image_classifier={level},tower_http={level},ort=off",
        level = level
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== AI IMAGE CLASSIFICATION ===");
    info!(
        "Config: model={} backend={} target_lang={} max_upload={}MB",
        config.classifier.model_id,
        config.classifier.backend,
        config.translation.target_language,
        config.upload.max_upload_mb
    );

    // Initialize metrics
    let metrics = Metrics::new();

    // Classifier
    info!("Loading classifier...");
    let classifier = build_classifier(&config.classifier)?;
    info!("✓ Classifier ready ({})", classifier.backend_name());

    // Translator behind a circuit breaker
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), Some(metrics.clone()));
    let translator = Arc::new(GoogleTranslator::new(
        &config.translation,
        Some(breaker),
        Some(metrics.clone()),
    )?);
    let labels = LabelTranslator::new(translator, Some(metrics.clone()));

    let analyzer = Arc::new(Analyzer::new(
        classifier,
        labels,
        metrics.clone(),
        config.display.thumbnail_max_width,
    ));

    let state = AppState::new(config.clone(), analyzer, metrics);

    match config.session_idle_timeout() {
        Some(max_idle) => {
            info!("Sessions expire after {}s idle", max_idle.as_secs());
            state.sessions.start_sweeper(max_idle);
        }
        None => info!("Session expiry disabled"),
    }

    let app = build_router(state);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    for (method, path, description) in ENDPOINTS {
        info!("  {:<4} {:<14} - {}", method, path, description);
    }
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
