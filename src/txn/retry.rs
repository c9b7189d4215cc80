//! Retry policy for transient restructuring conflicts
//!
//! An attempt returns `Ok` (done), `Err(MvccError::Retry)` (try again after
//! the delay) or any other error (give up immediately).

use std::thread;
use std::time::Duration;

use crate::error::{MvccError, MvccResult};

/// Shortest pause the policy will ever sleep between attempts.
const MIN_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// `delay` is raised to one millisecond if smaller; the loop never spins.
    /// `max_attempts` of `None` retries until the attempt stops asking to.
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay: delay.max(MIN_DELAY),
            max_attempts,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Run `attempt` until it stops returning `Retry`.
    ///
    /// The closure receives the 1-based attempt number. Exceeding
    /// `max_attempts` yields `RetriesExhausted`; `Retry` itself is never
    /// returned.
    pub fn run<T, F>(&self, mut attempt: F) -> MvccResult<T>
    where
        F: FnMut(u32) -> MvccResult<T>,
    {
        let mut n: u32 = 1;
        loop {
            match attempt(n) {
                Err(e) if e.is_retry() => {
                    if let Some(max) = self.max_attempts {
                        if n >= max {
                            return Err(MvccError::RetriesExhausted { attempts: n });
                        }
                    }
                    thread::sleep(self.delay);
                    n = n.saturating_add(1);
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(crate::config::DEFAULT_COMMIT_RETRY_DELAY_MS),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_success_does_not_sleep() {
        let policy = RetryPolicy::new(Duration::from_millis(50), None);
        let start = Instant::now();
        let out = policy.run(|_| Ok::<_, MvccError>(7)).unwrap();
        assert_eq!(out, 7);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_retries_until_success_with_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(5), None);
        let start = Instant::now();
        let mut calls = 0;
        let out = policy
            .run(|attempt| {
                calls += 1;
                if attempt < 4 {
                    Err(MvccError::Retry)
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();

        assert_eq!(out, 4);
        assert_eq!(calls, 4);
        // three sleeps of at least 5ms each
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_other_errors_stop_immediately() {
        let policy = RetryPolicy::new(Duration::from_millis(1), None);
        let mut calls = 0;
        let err = policy
            .run(|_| -> MvccResult<()> {
                calls += 1;
                Err(MvccError::storage("disk"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.code(), "POSTING_STORAGE_IO");
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Some(3));
        let mut calls = 0;
        let err = policy
            .run(|_| -> MvccResult<()> {
                calls += 1;
                Err(MvccError::Retry)
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, MvccError::RetriesExhausted { attempts: 3 }));
    }

    #[test]
    fn test_zero_delay_is_raised() {
        let policy = RetryPolicy::new(Duration::ZERO, None);
        assert_eq!(policy.delay(), MIN_DELAY);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(), Duration::from_millis(5));
        assert_eq!(policy.max_attempts(), None);
    }
}
