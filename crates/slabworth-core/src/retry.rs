//! Bounded retry with exponential backoff for a single provider call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Errors opt in to retrying; permanent failures are re-raised immediately.
pub trait RetryableError: fmt::Display {
    fn is_retryable(&self) -> bool;
}

/// Backoff strategy between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Fixed delay between retries.
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Apply +/- 50% random jitter, still clamped to `max`.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(1_000),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scaled = base.as_secs_f64() * factor.powi(attempt as i32);
                let mut delay = Duration::from_secs_f64(scaled.min(max.as_secs_f64()));

                if jitter {
                    let half = (delay.as_millis() as f64 * 0.5) as u64;
                    let offset = fastrand::u64(0..=half.saturating_mul(2));
                    let jittered = delay.as_millis() as i64 + (offset as i64 - half as i64);
                    delay = Duration::from_millis(jittered.max(0) as u64);
                }

                // The cap holds even after jitter.
                delay.min(max)
            }
        }
    }
}

type RetryHook = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// Retry policy for one guarded call.
///
/// `attempts` counts total tries; the default of 3 means one initial call and
/// up to two retries. Only retryable errors re-enter the loop, and the final
/// error is re-raised unchanged.
#[derive(Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
    on_retry: Option<RetryHook>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("backoff", &self.backoff)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::default(),
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Backoff) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            on_retry: None,
        }
    }

    /// Single-try policy, for providers where retrying cannot help.
    pub fn no_retry() -> Self {
        Self::new(1, Backoff::Fixed { delay: Duration::ZERO })
    }

    /// Observe each retry before it sleeps; receives the attempt number just
    /// failed (1-based) and the error text.
    pub fn with_on_retry(mut self, hook: impl Fn(u32, &str) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Drive `op` until it succeeds, exhausts `attempts`, or fails
    /// permanently.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.attempts || !error.is_retryable() {
                        return Err(error);
                    }
                    if let Some(hook) = &self.on_retry {
                        hook(attempt, &error.to_string());
                    }
                    tokio::time::sleep(self.backoff.delay(attempt - 1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct FakeError {
        retryable: bool,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("fake failure")
        }
    }

    impl RetryableError for FakeError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(1_000),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(1), Duration::from_millis(2_000));
        assert_eq!(backoff.delay(2), Duration::from_millis(4_000));
        assert_eq!(backoff.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn jittered_delay_never_exceeds_the_cap() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(20),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: true,
        };

        for attempt in 0..6 {
            assert!(backoff.delay(attempt) <= Duration::from_secs(30));
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, FakeError> = fast_policy(3)
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FakeError { retryable: true })
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_attempts_reraises_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> = fast_policy(3)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError { retryable: true }) }
            })
            .await;

        assert_eq!(result, Err(FakeError { retryable: true }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> = fast_policy(5)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError { retryable: false }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_hook_fires_before_each_retry() {
        let observed = Arc::new(AtomicU32::new(0));
        let hook_observed = Arc::clone(&observed);

        let result: Result<(), FakeError> = fast_policy(3)
            .with_on_retry(move |_attempt, _error| {
                hook_observed.fetch_add(1, Ordering::SeqCst);
            })
            .run(|| async { Err(FakeError { retryable: true }) })
            .await;

        assert!(result.is_err());
        // Three attempts, two sleeps between them.
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }
}
