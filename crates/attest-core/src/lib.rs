//! # attest-core
//!
//! Core types for attest, a behavior verification engine for interactive
//! web applications.
//!
//! ## Core Paradigm
//!
//! - A behavior is a named capability, verified by running one of its scenarios
//! - Scenarios are ordered Act/Check steps written in natural language
//! - Behaviors declare the behaviors that must run first to reach their start state
//! - Checks are either deterministic (literal page inspection) or semantic (judged)

pub mod catalog;
pub mod classifier;
pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use catalog::Catalog;
pub use classifier::{classify, parse_deterministic, quoted_text_expectation, TextExpectation};
pub use config::{AttestConfig, CyclePolicy};
pub use error::{AttestError, Result};
pub use types::*;
