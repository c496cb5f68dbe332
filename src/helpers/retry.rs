//! Retry with exponential backoff and optional jitter.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::FanoutCfg;

/// Errors that can tell whether another attempt might succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&FanoutCfg> for RetryConfig {
    fn from(cfg: &FanoutCfg) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_backoff: cfg.initial_backoff(),
            max_backoff: cfg.max_backoff(),
            ..Default::default()
        }
    }
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or retries run out.
/// The last error is returned.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    warn!(error = %e, "max retries ({}) reached", config.max_retries);
                    return Err(e);
                }

                let delay = if config.jitter { jittered(backoff) } else { backoff };
                warn!(error = %e, "retry attempt {}/{}, waiting {:?}", attempt, config.max_retries, delay);
                tokio::time::sleep(delay).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * config.backoff_multiplier)
                        .min(config.max_backoff.as_millis() as f64)) as u64,
                );
            }
        }
    }
}

/// Scale `base` by a random factor in 0.7..1.3.
pub fn jittered(base: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}
