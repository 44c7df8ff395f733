//! Detect the translation plugin of a WordPress site from the command line.
//!
//! Usage:
//!   cargo run --bin detect -- <site-url> [username] [app-password]
//!
//! Username and password fall back to:
//! - WP_USERNAME
//! - WP_APP_PASSWORD

use anyhow::{Context, Result};
use wp_multilingual_sync::config::Config;
use wp_multilingual_sync::detector::detect_plugin_for;
use wp_multilingual_sync::i18n::normalize;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wp_multilingual_sync=debug".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let site_url = args
        .next()
        .context("Usage: detect <site-url> [username] [app-password]")?;
    let username = match args.next() {
        Some(u) => u,
        None => std::env::var("WP_USERNAME").context("WP_USERNAME not set")?,
    };
    let app_password = match args.next() {
        Some(p) => p,
        None => std::env::var("WP_APP_PASSWORD").context("WP_APP_PASSWORD not set")?,
    };

    let config = Config::from_env()?;
    let info = detect_plugin_for(&config, &site_url, &username, &app_password).await?;

    println!("Plugin:    {}", info.plugin);
    println!(
        "Version:   {}",
        info.version.as_deref().unwrap_or("unknown")
    );
    println!("Languages:");
    for tag in &info.supported_languages {
        match normalize(tag) {
            Some(language) => println!("  {:<10} -> {} ({})", tag, language, language.name()),
            None => println!("  {:<10} -> unsupported", tag),
        }
    }
    println!("Settings:  {}", serde_json::to_string_pretty(&info.settings)?);

    Ok(())
}
