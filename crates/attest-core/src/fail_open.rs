//! Fail-open helpers for best-effort page operations
//!
//! Recovery passes (overlay dismissal, re-baselining the diff oracle) and
//! diagnostics capture must never turn a step result into a crash. Wrap
//! them with these helpers so a failure is logged and swallowed.
//!
//! Do NOT use fail-open for:
//! - The instruction being executed (its failure is the step result)
//! - Oracle votes (a swallowed error would read as a pass or fail)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run a best-effort operation, logging and discarding any error
///
/// ```no_run
/// use attest_core::fail_open::fail_open;
/// use attest_core::Result;
///
/// async fn dismiss_overlay() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let dismissed = fail_open("overlay_dismissal", || dismiss_overlay()).await;
///     // None if dismiss_overlay() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but substitutes `fallback` on error
pub async fn fail_open_or<F, Fut, T>(operation_name: &str, fallback: T, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    fail_open(operation_name, f).await.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttestError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, AttestError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(AttestError::Browser("page closed".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_or_fallback() {
        let url = fail_open_or("read_url", String::from("about:blank"), || async {
            Err::<String, _>(AttestError::Browser("detached".to_string()))
        })
        .await;
        assert_eq!(url, "about:blank");
    }
}
