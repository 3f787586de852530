use analysis_core::SourceError;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential backoff for rate-limit and transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// `base_backoff * 2^attempt`, attempt counted from 0
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds, fails non-transiently, or runs out of retries
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_retries {
                        tracing::warn!("{}: giving up after {} attempts: {}", label, attempt + 1, err);
                        return Err(SourceError::RetryExhausted {
                            attempts: attempt + 1,
                            last: Box::new(err),
                        });
                    }
                    let wait = self.delay_for(attempt);
                    tracing::warn!(
                        "{}: {} - retrying in {:.1}s ({}/{})",
                        label,
                        err,
                        wait.as_secs_f64(),
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Free-function form of [`RetryPolicy::run`]
pub async fn with_retry<T, F, Fut>(
    operation: F,
    max_retries: u32,
    base_backoff: Duration,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    RetryPolicy::new(max_retries, base_backoff)
        .run("request", operation)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert!(policy.delay_for(64) >= policy.delay_for(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(SourceError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            },
            3,
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_tagged() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Transient("503".into()))
            },
            3,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));
        match result {
            Err(SourceError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(*last, SourceError::Transient("503".into()));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fails_fast() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::NotFound("ZZZZ".into()))
            },
            3,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(result, Err(SourceError::NotFound("ZZZZ".into())));
    }
}
