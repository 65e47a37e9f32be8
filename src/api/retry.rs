use std::future::Future;
use tokio::time::{sleep, Duration};

/// Bounded retry policy applied to every remote exchange call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping
/// `policy.delay` between failures.
///
/// Returns `None` once attempts are exhausted so callers can skip the
/// current tick instead of crashing the loop. Every attempt and the final
/// outcome are logged; nothing is silently swallowed.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut operation: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", op_name, attempt);
                }
                return Some(value);
            }
            Err(e) => {
                if attempt < policy.max_attempts {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        op_name,
                        attempt,
                        policy.max_attempts,
                        e,
                        policy.delay
                    );
                    sleep(policy.delay).await;
                } else {
                    tracing::error!(
                        "{} failed after {} attempts: {}. Marking unavailable.",
                        op_name,
                        policy.max_attempts,
                        e
                    );
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(5), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Box<dyn std::error::Error + Send + Sync>>(42) }
        })
        .await;

        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(5), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err::<u32, _>("transient".into())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_none() {
        let calls = AtomicU32::new(0);
        let result: Option<u32> = with_retry(&fast_policy(5), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".into()) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
