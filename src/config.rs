use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_path: String,

    // API
    pub api_key: Option<String>,
    pub port: u16,

    // Outbound WordPress requests
    pub http_timeout_secs: u64,

    // Sync behaviour
    pub sync_page_size: u32,
    pub sync_max_pages: u32,
    pub sync_stale_after_minutes: i64,
    pub error_summary_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Storage
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/sync.db".to_string()),

            // API - no key means the API is open (local development)
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            port: match std::env::var("PORT") {
                Ok(v) => v.parse().context("PORT must be a valid port number")?,
                Err(_) => 8080,
            },

            // Outbound WordPress requests
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 15),

            // Sync behaviour
            sync_page_size: env_or("SYNC_PAGE_SIZE", 20).clamp(1, 100),
            sync_max_pages: env_or("SYNC_MAX_PAGES", 10).max(1),
            sync_stale_after_minutes: env_or("SYNC_STALE_AFTER_MINUTES", 30),
            error_summary_limit: env_or("ERROR_SUMMARY_LIMIT", 10),
        })
    }

    /// Timeout applied to every outbound HTTP call
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "data/sync.db".to_string(),
            api_key: None,
            port: 8080,
            http_timeout_secs: 15,
            sync_page_size: 20,
            sync_max_pages: 10,
            sync_stale_after_minutes: 30,
            error_summary_limit: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.http_timeout_secs, 15);
        assert_eq!(config.sync_page_size, 20);
        assert_eq!(config.sync_max_pages, 10);
        assert_eq!(config.error_summary_limit, 10);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_http_timeout_duration() {
        let config = Config {
            http_timeout_secs: 3,
            ..Config::default()
        };
        assert_eq!(config.http_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_or_falls_back_on_missing_var() {
        let value: u32 = env_or("WP_SYNC_TEST_SURELY_UNSET_VAR", 42);
        assert_eq!(value, 42);
    }
}
