mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use coderun_common::{Config, LanguageRegistry};
use coderun_engine::{Executor, HttpTransport, Transport};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState<T: Transport = HttpTransport> {
    pub executor: Executor<T>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing(std::env::var("LOG_FORMAT").ok().as_deref());

    info!("coderun API booting...");

    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(endpoints = ?config.endpoints, deadline_ms = config.attempt_deadline_ms, "Loaded configuration");

    let registry = match &config.language_config_path {
        Some(path) => LanguageRegistry::load_from_file(path)
            .with_context(|| format!("Failed to load language configuration from {}", path))?,
        None => LanguageRegistry::builtin(),
    };

    let ids: Vec<&str> = registry.languages().iter().map(|l| l.id.as_str()).collect();
    info!("Loaded language table: {:?}", ids);

    let executor = Executor::from_config(&config, registry).context("Failed to build HTTP client")?;

    let state = Arc::new(AppState { executor });

    let app = routes::build_router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

/// Install the subscriber; `LOG_FORMAT=json` switches to one JSON object per line
fn init_tracing(format: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json_logs(format) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
