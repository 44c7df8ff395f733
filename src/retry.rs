use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Preset: one page of posts from a WordPress site (3 attempts)
    /// Delays: 500ms, 1s
    pub fn wordpress_fetch() -> Self {
        Self::new(3, Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(2))
            .with_backoff_multiplier(2.0)
    }

    /// Delay before the given attempt (0-indexed); the first attempt never waits
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::wordpress_fetch()
    }
}

/// Run `operation` until it succeeds, `should_retry` rejects the error, or
/// attempts run out. Returns the last error in the latter two cases.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                max_attempts,
                delay
            );
            sleep(delay).await;
        }

        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("{}: Not retryable, giving up: {}", operation_name, error);
            return Err(error);
        }

        attempt += 1;
        if attempt >= max_attempts {
            warn!(
                "{}: All {} attempts failed. Last error: {}",
                operation_name, max_attempts, error
            );
            return Err(error);
        }

        warn!(
            "{}: Attempt {}/{} failed ({}), {} retries remaining",
            operation_name,
            attempt,
            max_attempts,
            error,
            max_attempts - attempt
        );
    }
}
