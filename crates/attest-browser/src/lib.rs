//! Browser control and adapters for attest
//!
//! This crate holds every capability the verification engine consumes, each
//! behind a trait so the engine can run against a real browser or against
//! in-memory mocks.
//!
//! # Features
//!
//! - **Page control**: [`PageControl`], implemented over Chrome DevTools Protocol by [`BrowserSession`]
//! - **Agent adapters**: [`ActionAgent`] and [`Judge`], implemented by the HTTP sidecar client [`HttpAgent`]
//! - **Diff oracle**: [`DiffOracle`], implemented by [`SnapshotDiffOracle`] over DOM outlines
//! - **Modal handling**: one-query detection, auto-confirm and leftover dismissal
//! - **DOM fallbacks**: native select handling and text/attribute click matching
//! - **Inspection**: deterministic checks and failure diagnostics
//!
//! # Example
//!
//! ```no_run
//! use attest_browser::{inspect, BrowserSession, PageControl};
//! use attest_core::DeterministicCheck;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = BrowserSession::launch().await?;
//!     session.navigate("http://localhost:3000/tasks").await?;
//!
//!     let check = DeterministicCheck::UrlContains { expected: "/tasks".to_string() };
//!     let inspection = inspect(&session, &check).await?;
//!     assert!(inspection.passed);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed for [`BrowserSession`]
//! - An instruction-following sidecar for [`HttpAgent`]

pub mod agent;
pub mod browser;
pub mod diagnostics;
pub mod dom_fallback;
pub mod error;
pub mod modal;
pub mod oracle;
pub mod page;
pub mod testing;
pub mod verification;

pub use agent::{judge_yes_no, ActOutcome, ActionAgent, HttpAgent, Judge, Judgment, ObservedElement};
pub use browser::{BrowserConfig, BrowserSession};
pub use diagnostics::{capture_failure, interactive_elements, is_unexpected_page, page_context_summary};
pub use dom_fallback::{click_by_text, element_tag, select_by_scan, select_native, ClickMatch};
pub use error::{BrowserError, Result};
pub use modal::{auto_confirm, detect_modal, dismiss_leftover, wait_for_dismissal, wait_for_modal};
pub use oracle::{DiffOracle, SnapshotDiffOracle};
pub use page::PageControl;
pub use verification::{inspect, text_presence, Inspection};
