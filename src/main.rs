//! Main entry point for the Image Chat Gateway

use imagechat_gateway::{api, config::Settings, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up provider keys from a local .env if present
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    info!("Starting Image Chat Gateway");
    info!(
        "Loaded configuration: server={}:{}, provider={}",
        settings.server.host,
        settings.server.port,
        settings.provider.kind.display_name()
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let sweep_interval = settings.rate_limit.sweep_interval();

    let app_state = Arc::new(AppState::from_settings(settings)?);

    let sweeper = match &app_state.admission {
        Some(admission) => {
            info!(
                min_interval_secs = admission.config().min_interval.as_secs(),
                max_in_flight = admission.config().max_in_flight,
                "Per-client admission control enabled"
            );
            Some(admission.spawn_sweeper(sweep_interval))
        }
        None => {
            warn!("Per-client admission control disabled");
            None
        }
    };

    let app = api::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
