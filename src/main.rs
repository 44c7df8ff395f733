use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::{info, warn};
use wp_multilingual_sync::api::{self, AppState};
use wp_multilingual_sync::config::Config;
use wp_multilingual_sync::db::Database;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wp_multilingual_sync=info".parse()?),
        )
        .init();

    info!("Starting WordPress multilingual sync service");

    let config = Config::from_env()?;

    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let db = Database::new(&config.database_path)?;
    info!("Database ready at {}", config.database_path);

    if config.api_key.is_none() {
        warn!("API_KEY not set, /api routes are unauthenticated");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = api::router(AppState::new(config, db));

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind HTTP listener")?;
    axum::serve(listener, app).await?;

    Ok(())
}
