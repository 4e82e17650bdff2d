//! HTTP reachability probing with exponential backoff.

use std::time::Duration;

use tagcheck_common::constants::{
    PROBE_BACKOFF_BASE_SECS, PROBE_BACKOFF_MAX_SECS, PROBE_MAX_ATTEMPTS, PROBE_RETRY_STATUSES,
};

use super::{VisualError, VisualFailure};
use crate::clock::Clock;

/// Per-request timeout of a reachability attempt.
const PROBE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Checks that an HTTP endpoint answers.
pub trait Reachability {
    /// Returns once `url` answers with a non-retryable status.
    ///
    /// # Errors
    ///
    /// Returns a classified error when every attempt failed.
    fn probe(&self, url: &str) -> Result<(), VisualError>;
}

/// Bounded retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubled after each further one.
    pub base_delay: Duration,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
    /// Status codes that count as transient.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PROBE_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(PROBE_BACKOFF_BASE_SECS),
            max_delay: Duration::from_secs(PROBE_BACKOFF_MAX_SECS),
            retry_statuses: PROBE_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether a response status deserves another attempt.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Verdict of one attempt.
#[derive(Debug)]
pub enum Attempt {
    /// The endpoint answered.
    Done,
    /// Transient failure; try again if attempts remain.
    Retry(VisualError),
    /// Permanent failure; stop immediately.
    Abort(VisualError),
}

/// Runs `attempt` until it succeeds, aborts, or the policy is exhausted,
/// sleeping on `clock` between attempts.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub fn retry_with_backoff<F>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut attempt: F,
) -> Result<(), VisualError>
where
    F: FnMut(u32) -> Attempt,
{
    let mut last = VisualError::new(VisualFailure::ConnectionError, "no attempt made");
    for n in 1..=policy.max_attempts {
        match attempt(n) {
            Attempt::Done => return Ok(()),
            Attempt::Abort(e) => return Err(e),
            Attempt::Retry(e) => {
                tracing::debug!(attempt = n, error = %e, "attempt failed");
                last = e;
                if n < policy.max_attempts {
                    clock.sleep(policy.delay_after(n));
                }
            }
        }
    }
    Err(last)
}

/// [`Reachability`] over a blocking `reqwest` client.
pub struct HttpProbe<'a> {
    client: reqwest::blocking::Client,
    policy: RetryPolicy,
    clock: &'a dyn Clock,
}

impl<'a> HttpProbe<'a> {
    /// Builds a probe with the given policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(policy: RetryPolicy, clock: &'a dyn Clock) -> Result<Self, VisualError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(PROBE_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| VisualError::new(VisualFailure::Unknown, e.to_string()))?;
        Ok(Self {
            client,
            policy,
            clock,
        })
    }

    fn attempt(&self, url: &str, n: u32) -> Attempt {
        match self.client.get(url).send() {
            Ok(response) => {
                let status = response.status().as_u16();
                if self.policy.is_retryable_status(status) {
                    Attempt::Retry(VisualError::new(
                        VisualFailure::ConnectionError,
                        format!("{url} answered {status} on attempt {n}"),
                    ))
                } else {
                    tracing::debug!(url, status, attempt = n, "endpoint reachable");
                    Attempt::Done
                }
            }
            Err(e) if e.is_timeout() => {
                Attempt::Retry(VisualError::new(VisualFailure::Timeout, e.to_string()))
            }
            Err(e) if e.is_connect() || e.is_request() => {
                Attempt::Retry(VisualError::new(VisualFailure::ConnectionError, e.to_string()))
            }
            Err(e) => Attempt::Abort(VisualError::from_reqwest(&e)),
        }
    }
}

impl Reachability for HttpProbe<'_> {
    fn probe(&self, url: &str) -> Result<(), VisualError> {
        tracing::info!(url, max_attempts = self.policy.max_attempts, "probing helper endpoint");
        retry_with_backoff(&self.policy, self.clock, |n| self.attempt(url, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(6), Duration::from_secs(64));
        assert_eq!(policy.delay_after(7), Duration::from_secs(120));
        assert_eq!(policy.delay_after(40), Duration::from_secs(120));
    }

    #[test]
    fn retryable_statuses_are_gateway_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable_status(502));
        assert!(policy.is_retryable_status(503));
        assert!(policy.is_retryable_status(504));
        assert!(!policy.is_retryable_status(500));
        assert!(!policy.is_retryable_status(404));
    }

    #[test]
    fn exhausted_retries_return_last_error_after_ten_attempts() {
        let policy = RetryPolicy::default();
        let clock = ManualClock::new();
        let mut calls = 0;
        let err = retry_with_backoff(&policy, &clock, |n| {
            calls += 1;
            Attempt::Retry(VisualError::new(
                VisualFailure::ConnectionError,
                format!("refused {n}"),
            ))
        })
        .unwrap_err();
        assert_eq!(calls, 10);
        assert_eq!(err.kind, VisualFailure::ConnectionError);
        assert_eq!(err.message, "refused 10");
        // Nine sleeps between ten attempts: 2+4+8+16+32+64+120+120+120.
        assert_eq!(clock.sleep_count(), 9);
        assert_eq!(clock.elapsed(), Duration::from_secs(486));
    }

    #[test]
    fn success_stops_retrying() {
        let policy = RetryPolicy::default();
        let clock = ManualClock::new();
        let result = retry_with_backoff(&policy, &clock, |n| {
            if n < 3 {
                Attempt::Retry(VisualError::new(VisualFailure::ConnectionError, "503"))
            } else {
                Attempt::Done
            }
        });
        assert!(result.is_ok());
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn abort_stops_immediately() {
        let policy = RetryPolicy::default();
        let clock = ManualClock::new();
        let err = retry_with_backoff(&policy, &clock, |_| {
            Attempt::Abort(VisualError::new(VisualFailure::Unknown, "bad url"))
        })
        .unwrap_err();
        assert_eq!(err.kind, VisualFailure::Unknown);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn unreachable_address_fails_with_connection_error() {
        let clock = ManualClock::new();
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let probe = HttpProbe::new(policy, &clock).expect("client");
        // Port 9 on localhost is the discard service and is closed on test hosts.
        let err = probe.probe("http://127.0.0.1:9/").unwrap_err();
        assert_eq!(err.kind, VisualFailure::ConnectionError);
        assert_eq!(clock.sleep_count(), 1);
    }
}
