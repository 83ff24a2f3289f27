//! Bounded retry with exponential backoff

use std::time::Duration;

use crate::clock::Clock;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient failure; counts against the attempt budget
    Retry,
    /// Remote quota hit; wait (optionally for the given time) and try again
    RateLimited(Option<Duration>),
    /// Permanent failure; surface immediately
    Fail,
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn disposition(&self) -> Disposition;
}

/// Bounded retry policy.
///
/// `max_attempts` counts every request including the first, so a policy of
/// 3 fails after the third consecutive transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Rate-limit waits allowed per request; these do not consume attempts
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_rate_limit_waits: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    /// Exponential backoff before retry number `retry` (1-based):
    /// `base * 2^(retry-1)`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last: E },
    /// Remote kept rate-limiting past the wait budget
    RateLimited { waits: u32, last: E },
    /// Permanent failure on attempt `attempts`
    Fatal { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of requests issued before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Fatal { attempts, .. } => *attempts,
            Self::RateLimited { waits, .. } => *waits,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } | Self::RateLimited { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::RateLimited { waits, last } => {
                write!(f, "still rate limited after {waits} waits: {last}")
            }
            Self::Fatal { error, .. } => write!(f, "{error}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Retry a fallible operation according to `policy`.
///
/// `attempt_fn` receives the 1-based attempt number. Transient errors back
/// off exponentially; rate-limit errors sleep for the server's hint (or the
/// backoff delay) without consuming an attempt; permanent errors return at
/// once. All sleeping goes through `clock`.
pub fn retry_with_backoff<T, E>(
    label: &str,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failures = 0u32;
    let mut waits = 0u32;
    loop {
        let err = match attempt_fn(failures + 1) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match err.disposition() {
            Disposition::Retry => {
                failures += 1;
                if failures >= max_attempts {
                    log::error!("{label}: failed after {failures} attempts: {err}");
                    return Err(RetryError::Exhausted {
                        attempts: failures,
                        last: err,
                    });
                }
                let delay = policy.backoff(failures);
                log::warn!(
                    "{label}: attempt {failures}/{max_attempts} failed: {err}, \
                     retrying in {delay:?}"
                );
                clock.sleep(delay);
            }
            Disposition::RateLimited(hint) => {
                waits += 1;
                if waits > policy.max_rate_limit_waits {
                    log::error!("{label}: rate limited {waits} times, giving up: {err}");
                    return Err(RetryError::RateLimited { waits, last: err });
                }
                let delay = hint.unwrap_or_else(|| policy.backoff(waits));
                log::warn!("{label}: rate limited ({err}), waiting {delay:?}");
                clock.sleep(delay);
            }
            Disposition::Fail => {
                log::error!("{label}: failed permanently: {err}");
                return Err(RetryError::Fatal {
                    attempts: failures + 1,
                    error: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use chrono::{TimeZone, Utc};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Limited(Option<Duration>),
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn disposition(&self) -> Disposition {
            match self {
                Self::Transient => Disposition::Retry,
                Self::Limited(hint) => Disposition::RateLimited(*hint),
                Self::Permanent => Disposition::Fail,
            }
        }
    }

    fn clock() -> FakeClock {
        FakeClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(60))
    }

    #[test]
    fn backoff_exponential() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_capped() {
        let p = policy(5);
        assert_eq!(p.backoff(7), Duration::from_secs(60));
        assert_eq!(p.backoff(200), Duration::from_secs(60));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let clock = clock();
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("t", &policy(3), &clock, |_| {
            calls += 1;
            Err(TestError::Transient)
        });
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls, 3);
        // Sleeps only between attempts
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn succeeds_after_two_failures() {
        let clock = clock();
        let result = retry_with_backoff("t", &policy(3), &clock, |attempt| {
            if attempt < 3 {
                Err(TestError::Transient)
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn permanent_fails_immediately() {
        let clock = clock();
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("t", &policy(5), &clock, |_| {
            calls += 1;
            Err(TestError::Permanent)
        });
        assert!(matches!(
            result.unwrap_err(),
            RetryError::Fatal { attempts: 1, .. }
        ));
        assert_eq!(calls, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn rate_limit_does_not_consume_attempts() {
        let clock = clock();
        let mut calls = 0;
        let result = retry_with_backoff("t", &policy(2), &clock, |_| {
            calls += 1;
            match calls {
                1..=3 => Err(TestError::Limited(Some(Duration::from_secs(30)))),
                4 => Err(TestError::Transient),
                _ => Ok(()),
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 5);
        assert_eq!(clock.sleeps()[..3], [Duration::from_secs(30); 3]);
    }

    #[test]
    fn rate_limit_budget_bounded() {
        let clock = clock();
        let p = policy(3).with_rate_limit_waits(2);
        let result: Result<(), _> =
            retry_with_backoff("t", &p, &clock, |_| Err(TestError::Limited(None)));
        assert!(matches!(
            result.unwrap_err(),
            RetryError::RateLimited { waits: 3, .. }
        ));
        assert_eq!(clock.sleeps().len(), 2);
    }
}
