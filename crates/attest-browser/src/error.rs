//! Browser error types - re-exports the unified AttestError from attest-core
//!
//! Browser and adapter failures use these variants:
//! - Browser(String) - launch, navigation, CDP, script evaluation
//! - ElementNotFound(String) - a selector matched nothing
//! - Timeout(String) - a wait or request exceeded its limit
//! - Agent(String) / Judgment(String) - instruction-following sidecar failures
//!
//! Error messages should name the operation and the selector or URL involved.

pub use attest_core::{AttestError, Result};

pub type BrowserError = AttestError;
