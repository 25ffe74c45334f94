//! Retry logic with exponential backoff

use crate::{JoeyError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay slept before retry `attempt` (1-based): 1s, 2s, 4s with defaults
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Execute `f` up to `max_retries` times, sleeping the backoff delay before each call.
///
/// `f` receives the 1-based attempt number. Stops at the first success and
/// returns it with the attempt that produced it. Errors that are not
/// retryable end the loop immediately. Dropping the returned future cancels
/// any pending backoff sleep.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, mut f: F) -> Result<(T, usize)>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_retries {
        let delay = config.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
        tokio::time::sleep(delay).await;

        match f(attempt).await {
            Ok(result) => return Ok((result, attempt)),
            Err(e) if e.is_retryable() => {
                warn!(attempt, "Attempt {} failed: {}", attempt, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    let source = last_error.unwrap_or_else(|| JoeyError::other("no retry attempts configured"));
    error!("All {} retry attempts failed", config.max_retries);
    Err(JoeyError::RetriesExhausted {
        attempts: config.max_retries,
        source: Box::new(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));

        let capped = RetryConfig {
            max_delay: Duration::from_secs(3),
            ..RetryConfig::default()
        };
        assert_eq!(capped.delay_for(3), Duration::from_secs(3));
        assert_eq!(capped.delay_for(500), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let c = calls.clone();
        let (value, attempt) = retry_with_backoff(&RetryConfig::default(), move |n| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(JoeyError::transport(TransportStatus::Http(503), "busy"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(attempt, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts() {
        let start = Instant::now();
        let err = retry_with_backoff(&RetryConfig::default(), |_| async {
            Err::<(), _>(JoeyError::transport(TransportStatus::Http(500), "down"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, JoeyError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.transport_status(), Some(TransportStatus::Http(500)));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let err = retry_with_backoff(&RetryConfig::default(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(JoeyError::Cancelled) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, JoeyError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
