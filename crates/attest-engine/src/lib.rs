//! # attest-engine
//!
//! Verification engine for attest.
//!
//! This crate provides:
//! - Intent table for natural-language Act instructions
//! - Credential propagation across dependency chains
//! - Iterative dependency chain construction with a cycle policy
//! - Bounded retry with error categorization
//! - Dual-oracle check planning as a pure state machine
//! - Step execution with fallback tiers
//! - Session policies (hard reset, soft navigation, keep)
//! - Behavior and suite runners with a shared verification context

mod chain;
mod check;
mod context;
mod credentials;
mod executor;
mod intent;
mod retry;
mod runner;
mod session;
mod suite;
pub mod testing;

pub use chain::{build_chain, ChainLink};
pub use check::{advance, extraction_prompt, plan_for, CheckState, OracleKind, OraclePlan, PageTransition};
pub use context::{Summary, VerificationContext};
pub use credentials::{CredentialField, CredentialTracker};
pub use executor::{Adapters, StepExecutor, StepRuntime};
pub use intent::{click_target, detect_intent, intent_name, intent_rules, option_choice, Intent, IntentRule};
pub use retry::{categorize, categorize_error, ErrorCategory, RetryPolicy, TransientKind};
pub use runner::{BehaviorRunner, ExecutionOptions, ScenarioExecutor, ScenarioOutcome, ScenarioRunner};
pub use session::{is_auth_page, is_parameterized, SessionManager, SessionPolicy, SessionState};
pub use suite::{RunReport, SuiteRunner};
