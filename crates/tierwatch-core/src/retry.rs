//! Bounded retries with exponential backoff around any [`Fetcher`].
//!
//! Only transient failures (see [`AppError::is_retryable`]) are retried.
//! Terminal errors and the last transient error are returned unchanged.

use std::time::Duration;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Retry policy for upstream fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Add up to half the computed delay as random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_bounds(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given failed attempt (1-indexed):
    /// `clamp(base * 2^(attempt - 1), min, max)`, plus jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .base_delay
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay);
        if !self.jitter {
            return delay;
        }
        let extra = rand_jitter_ms(delay.as_millis() as u64 / 2);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Whether a failure on `attempt` (1-indexed) should be followed by another try.
    pub fn should_retry(&self, error: &AppError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

/// A [`Fetcher`] wrapper that applies a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        %url,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
    high % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockFetcher;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_bounds(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn delay_respects_the_floor() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(10))
            .with_bounds(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let policy = RetryPolicy::default().with_jitter(true);
        for _ in 0..50 {
            let d = policy.delay_for_attempt(2);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn transient_failures_then_success() {
        let inner = MockFetcher::with_responses(vec![
            Err(AppError::NetworkError("reset".into())),
            Err(AppError::Timeout(10)),
            Ok("<html>ok</html>".into()),
        ]);
        let fetcher = RetryingFetcher::new(inner.clone(), fast_policy(3));

        let body = fetcher.fetch("https://upstream/list").await.unwrap();
        assert_eq!(body, "<html>ok</html>");
        assert_eq!(inner.calls().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_with_last_error() {
        let inner = MockFetcher::with_responses(vec![
            Err(AppError::NetworkError("first".into())),
            Err(AppError::NetworkError("second".into())),
            Err(AppError::Timeout(10)),
            Ok("never reached".into()),
        ]);
        let fetcher = RetryingFetcher::new(inner.clone(), fast_policy(3));

        let err = fetcher.fetch("https://upstream/list").await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(10)));
        assert_eq!(inner.calls().len(), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let inner = MockFetcher::with_responses(vec![
            Err(AppError::UpstreamError("HTTP 404".into())),
            Ok("never reached".into()),
        ]);
        let fetcher = RetryingFetcher::new(inner.clone(), fast_policy(3));

        let err = fetcher.fetch("https://upstream/list").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
        assert_eq!(inner.calls().len(), 1);
    }
}
