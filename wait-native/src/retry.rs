//! Retry an async operation with exponential backoff.
//!
//! The delay before retry `n` (zero-based) is
//! `min(initial_delay * factor^n, max_delay)`, optionally down-jittered by up
//! to `jitter` (0.25 means the delay is multiplied by a factor in `[0.75, 1.0]`).

use {
    crate::sleep::sleep_for,
    std::{future::Future, time::Duration},
};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth factor applied per retry
    pub factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Down-jitter fraction in `[0.0, 1.0]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    #[must_use]
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before retry number `retry` (0 before the first retry)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let scale = if jitter > 0.0 {
            1.0 - rand::random::<f64>() * jitter
        } else {
            1.0
        };

        Duration::try_from_secs_f64(capped * scale).unwrap_or(self.max_delay)
    }
}

/// A backoff function doubling from `initial` up to `max`, for
/// [`WaitOptions::backoff`](crate::WaitOptions::backoff)
pub fn exponential_backoff(initial: Duration, max: Duration) -> impl Fn(u32) -> Duration + Clone + Send + Sync + 'static {
    let policy = RetryPolicy::new().initial_delay(initial).max_delay(max);
    move |attempt| policy.delay_for(attempt)
}

/// Why [`retry`] gave up
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },
    /// The retry predicate refused to retry this error
    #[error("attempt {attempt} failed with a non-retryable error: {error}")]
    Rejected { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Rejected { attempt, .. } => *attempt,
        }
    }

    /// The last error returned by the operation
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { error, .. } | Self::Rejected { error, .. } => error,
        }
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// `operation` receives the zero-based attempt index.
pub async fn retry<F, Fut, T, E>(operation: F, policy: &RetryPolicy) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_when(operation, policy, |_| true).await
}

/// Like [`retry`], but only errors for which `should_retry` returns true are
/// retried; any other error fails immediately with [`RetryError::Rejected`].
pub async fn retry_when<F, Fut, T, E, P>(mut operation: F, policy: &RetryPolicy, mut should_retry: P) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let made = attempt + 1;

        if !should_retry(&error) {
            tracing::debug!(attempt = made, "error is not retryable");
            return Err(RetryError::Rejected { attempt: made, error });
        }
        if made >= max_attempts {
            tracing::debug!(attempts = made, "retries exhausted");
            return Err(RetryError::Exhausted { attempts: made, error });
        }

        let delay = policy.delay_for(attempt);
        tracing::debug!(attempt = made, ?delay, "attempt failed, retrying");
        sleep_for(delay).await;
        attempt = made;
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::{
                Arc,
                atomic::{AtomicU32, Ordering},
            },
            time::Instant,
        },
    };

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new().initial_delay(Duration::from_millis(10)).max_delay(Duration::from_millis(40))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!((policy.factor - 2.0).abs() < f64::EPSILON);
        assert!(policy.jitter.abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(40));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = fast_policy().jitter(0.25);
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(15));
            assert!(delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_succeeds_after_failures() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();

        let start = Instant::now();
        let result = blockon::block_on(retry(
            move |attempt| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 2 { Err("flaky") } else { Ok(attempt) } }
            },
            &fast_policy(),
        ));

        assert_eq!(result, Ok(2));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        // 10ms + 20ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_exhausted() {
        let result = blockon::block_on(retry(|_| async { Err::<(), _>("down") }, &fast_policy().max_attempts(2)));

        assert_eq!(result, Err(RetryError::Exhausted { attempts: 2, error: "down" }));
        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.to_string(), "gave up after 2 attempts: down");
        assert_eq!(err.into_inner(), "down");
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = blockon::block_on(retry(
            move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("nope") }
            },
            &fast_policy().max_attempts(0),
        ));

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_retryable_error_fails_fast() {
        let start = Instant::now();
        let result = blockon::block_on(retry_when(
            |attempt| async move { if attempt == 0 { Err::<(), i32>(503) } else { Err(404) } },
            &fast_policy().max_attempts(5),
            |status| *status >= 500,
        ));

        assert_eq!(result, Err(RetryError::Rejected { attempt: 2, error: 404 }));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff_fn() {
        let backoff = exponential_backoff(Duration::from_millis(5), Duration::from_millis(12));
        assert_eq!(backoff(0), Duration::from_millis(5));
        assert_eq!(backoff(1), Duration::from_millis(10));
        assert_eq!(backoff(2), Duration::from_millis(12));
    }
}
