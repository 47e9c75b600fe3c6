//! Bounded retry with fixed delay
//!
//! Errors are categorized by message shape. Only transient categories are
//! retried; anything else ends the loop on the spot.

use attest_core::config::RetryConfig;
use attest_core::{AttestError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Transient failure kinds worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    MalformedOutput,
    RateLimit,
    Timeout,
    Connection,
}

/// Error taxonomy used to pick between retry, fallback and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient(TransientKind),
    ElementNotFound,
    UnexpectedPage,
    Other,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient(_))
    }
}

/// Categorize an error message
pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["malformed", "invalid json", "failed to parse", "could not parse"]) {
        ErrorCategory::Transient(TransientKind::MalformedOutput)
    } else if has(&["rate limit", "429", "too many requests"]) {
        ErrorCategory::Transient(TransientKind::RateLimit)
    } else if has(&["timed out", "timeout"]) {
        ErrorCategory::Transient(TransientKind::Timeout)
    } else if has(&["econnreset", "connection reset", "connection closed", "connection refused", "socket hang up"]) {
        ErrorCategory::Transient(TransientKind::Connection)
    } else if has(&["element not found", "no element", "could not find", "unable to find", "not found"]) {
        ErrorCategory::ElementNotFound
    } else if has(&["unexpected page"]) {
        ErrorCategory::UnexpectedPage
    } else {
        ErrorCategory::Other
    }
}

/// Categorize an [`AttestError`] by variant, falling back to its message
pub fn categorize_error(error: &AttestError) -> ErrorCategory {
    match error {
        AttestError::Timeout(_) => ErrorCategory::Transient(TransientKind::Timeout),
        AttestError::ElementNotFound(_) => ErrorCategory::ElementNotFound,
        AttestError::UnexpectedPage(_) => ErrorCategory::UnexpectedPage,
        other => categorize(&other.to_string()),
    }
}

/// Fixed-budget, fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds, fails non-retryably, or the budget is spent
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let category = categorize_error(&e);
                    if !category.is_retryable() || attempt >= self.max_attempts {
                        debug!(
                            "{} giving up after attempt {}/{} ({:?}): {}",
                            label, attempt, self.max_attempts, category, e
                        );
                        return Err(e);
                    }
                    warn!(
                        "{} attempt {}/{} failed ({:?}), retrying: {}",
                        label, attempt, self.max_attempts, category, e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_categorize() {
        assert_eq!(
            categorize("Malformed structured output from /extract"),
            ErrorCategory::Transient(TransientKind::MalformedOutput)
        );
        assert_eq!(
            categorize("Rate limit exceeded (429)"),
            ErrorCategory::Transient(TransientKind::RateLimit)
        );
        assert_eq!(categorize("Navigation timed out"), ErrorCategory::Transient(TransientKind::Timeout));
        assert_eq!(
            categorize("read ECONNRESET"),
            ErrorCategory::Transient(TransientKind::Connection)
        );
        assert_eq!(categorize("Could not find a 'Save' button"), ErrorCategory::ElementNotFound);
        assert_eq!(categorize("Unexpected page state: /login"), ErrorCategory::UnexpectedPage);
        assert_eq!(categorize("boom"), ErrorCategory::Other);
        assert!(!ErrorCategory::ElementNotFound.is_retryable());
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result = policy
            .run("act", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AttestError::Agent("Rate limit exceeded (429)".into()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_budget_and_non_retryable() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result: Result<()> = policy
            .run("act", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttestError::Timeout("slow".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let result: Result<()> = policy
            .run("act", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttestError::ElementNotFound("#save".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
