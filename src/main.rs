//! Main entry point for the Image Edit Gateway

use image_edit_gateway::{
    api,
    config::{LoggingConfig, Settings},
    engine::{http_engine::HttpEngine, SynthesisEngine},
    AppState,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Load the engine in the background, then open the gate and flip readiness
fn spawn_engine_loader(state: Arc<AppState>, mut engine: HttpEngine) {
    tokio::spawn(async move {
        info!(engine = %engine.name(), "Loading synthesis engine");

        if let Err(e) = engine.load().await {
            error!(error = %e, "Engine failed to load; service stays not-ready");
            return;
        }

        if let Err(e) = state.gate.start(Box::new(engine)) {
            error!(error = %e, "Failed to start resource gate");
            return;
        }

        state.readiness.mark_loaded();
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    init_logging(&settings.logging);

    info!("Starting Image Edit Gateway");
    info!(
        "Loaded configuration: server={}:{}, auth_enabled={}, max_queue_depth={}",
        settings.server.host,
        settings.server.port,
        settings.auth.api_key.is_some(),
        settings.gate.max_queue_depth
    );

    let engine = HttpEngine::new(&settings.engine)?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    // Create application state
    let app_state = Arc::new(AppState::new(settings));

    spawn_engine_loader(app_state.clone(), engine);

    // Build the router
    let app = api::create_router(app_state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
