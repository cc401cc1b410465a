//! research-assistant - HTTP Server Entry Point
//!
//! Starts the HTTP server that serves the research form and API.

use research_assistant::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_assistant=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: max_iterations={} fetch_timeout={:?} search_timeout={:?}",
        config.max_iterations, config.tools.fetch_timeout, config.tools.search_timeout
    );
    if let Some(path) = &config.tools.chrome_path {
        info!("Using browser executable {}", path.display());
    }

    // Start HTTP server
    info!("Starting server on {}:{}", config.host, config.port);

    api::serve(config).await?;

    Ok(())
}
