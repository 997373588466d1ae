//! Bounded retry for reaching the coordinator
//!
//! - Fixed: the same delay between every attempt
//! - Exponential: `delay * 2^(attempt-1)`, clamped to `max_delay`
//!
//! The delay is only slept between attempts, so `attempts` tries take at
//! least `(attempts - 1)` delays and never sleep after the final failure.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
            backoff: Backoff::Fixed,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// All attempts failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: String,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-indexed)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-indexed attempt number. Returns the value and the
    /// attempt it succeeded on.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<(T, u32), RetryExhausted>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.delay_after(attempt);
                        warn!(
                            "Attempt {}/{}: {} failed, retrying in {:?} ({})",
                            attempt, attempts, what, delay, last_error
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(
                            "Attempt {}/{}: {} failed ({})",
                            attempt, attempts, what, last_error
                        );
                    }
                }
            }
        }

        Err(RetryExhausted {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            delay: Duration::from_secs(2),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(10),
        };

        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(10));
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_retry_attempt_count_and_elapsed() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<((), u32), _> = policy
            .run("probe", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("connection refused")
                }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 5);
        assert_eq!(exhausted.last_error, "connection refused");
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // 4 gaps of 2s between 5 attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(8));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_midway() {
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(1),
            ..Default::default()
        };

        let result = policy
            .run("probe", |attempt| async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt * 10)
                }
            })
            .await;

        assert_eq!(result, Ok((30, 3)));
    }
}
