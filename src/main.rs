/*
 * Triton - Liquidity Position Engine
 * Main entry point for the application
 */

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triton::{api, config::Config, service::PositionService};

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Triton Liquidity Position Engine");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    let service = PositionService::new(config.clone())?;
    let api_state = api::ApiState {
        service: Arc::new(service),
    };

    info!(
        "Starting API server on {}:{}",
        config.server.host, config.server.port
    );

    let rocket = api::create_rocket(api_state);
    rocket.launch().await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triton=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
