use log::warn;
use std::fmt::Display;
use std::thread::sleep;
use std::time::Duration;

/// How often to attempt an operation, and how long to wait in between.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable` rejects, or the policy's
/// attempts are used up. The last error is returned as is.
pub fn retry<T, E, F, P>(policy: &RetryPolicy, is_retryable: P, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                warn!(
                    "Attempt {attempt}/{} failed: {e}; retrying in {:?}",
                    policy.max_attempts, policy.delay
                );
                sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const IMMEDIATE: RetryPolicy = RetryPolicy::new(10, Duration::ZERO);

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn is_transient(e: &TestError) -> bool {
        *e == TestError::Transient
    }

    #[test]
    fn first_success_returns_immediately() {
        let calls = Cell::new(0);
        let result: Result<_, TestError> = retry(&IMMEDIATE, is_transient, || {
            calls.set(calls.get() + 1);
            Ok(42)
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn succeeds_on_last_attempt() {
        let calls = Cell::new(0);
        let result = retry(&IMMEDIATE, is_transient, || {
            calls.set(calls.get() + 1);
            if calls.get() < 10 {
                Err(TestError::Transient)
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(calls.get(), 10);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry(&IMMEDIATE, is_transient, || {
            calls.set(calls.get() + 1);
            Err(TestError::Transient)
        });
        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(calls.get(), 10);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry(&IMMEDIATE, is_transient, || {
            calls.set(calls.get() + 1);
            Err(TestError::Fatal)
        });
        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry(&RetryPolicy::new(0, Duration::ZERO), is_transient, || {
            calls.set(calls.get() + 1);
            Err(TestError::Transient)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }
}
