//! Exponential backoff retry wrapper
//!
//! Outbound calls made by the credential subsystem (token exchange, refresh
//! grants) are wrapped in [`with_exponential_backoff`].  Every failure is
//! retried; the wrapper does not classify errors.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::Result;

/// Retry schedule for [`with_exponential_backoff`].
///
/// The first retry waits `initial_delay`; each later wait is multiplied by
/// `backoff_factor` and capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Computes the delay slept before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
        }
    }
}

/// Runs `operation`, retrying on any error according to `policy`.
///
/// The operation runs at most `policy.max_retries + 1` times.  When every
/// attempt fails the last error is returned unchanged, so callers can still
/// downcast it to [`crate::error::CredflowError`].
///
/// # Arguments
///
/// * `label` - Short description used in log lines
/// * `policy` - Retry schedule
/// * `operation` - Closure producing a fresh future per attempt
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
/// use credflow::retry::{with_exponential_backoff, BackoffPolicy};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let attempts = &AtomicU32::new(0);
/// let policy = BackoffPolicy {
///     max_retries: 2,
///     initial_delay: Duration::from_millis(1),
///     max_delay: Duration::from_millis(2),
///     backoff_factor: 2.0,
/// };
/// let value = with_exponential_backoff("demo", &policy, move || async move {
///     if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
///         anyhow::bail!("transient");
///     }
///     Ok(7)
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 7);
/// # });
/// ```
pub async fn with_exponential_backoff<T, F, Fut>(
    label: &str,
    policy: &BackoffPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                retry += 1;
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    retry,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if policy.max_retries > 0 {
                    tracing::warn!(
                        "{} failed after {} attempts: {}",
                        label,
                        policy.max_retries + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CredflowError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.backoff_factor, 2.0);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_from_retry_config() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
            backoff_factor: 3.0,
        };
        let policy = BackoffPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
        assert_eq!(policy.backoff_factor, 3.0);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_does_not_retry() {
        let calls = &AtomicU32::new(0);
        let result = with_exponential_backoff("op", &fast_policy(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("ok")
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = with_exponential_backoff("op", &fast_policy(3), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                anyhow::bail!("transient {n}");
            }
            Ok(n)
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let calls = &AtomicU32::new(0);
        let err = with_exponential_backoff("op", &fast_policy(2), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("failure {n}"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "failure 2");
    }

    #[tokio::test]
    async fn test_error_type_survives_retries() {
        let err = with_exponential_backoff("op", &fast_policy(1), || async {
            Err::<(), _>(CredflowError::TokenExchange("invalid_grant".into()).into())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CredflowError>(),
            Some(CredflowError::TokenExchange(_))
        ));
    }

    #[tokio::test]
    async fn test_no_retry_policy_makes_single_attempt() {
        let calls = &AtomicU32::new(0);
        let _ = with_exponential_backoff("op", &BackoffPolicy::no_retry(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
