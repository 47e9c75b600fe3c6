//! Unified error types for attest

use thiserror::Error;

/// Unified error type for all attest operations
#[derive(Error, Debug)]
pub enum AttestError {
    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Unexpected page state: {0}")]
    UnexpectedPage(String),

    // Adapter errors
    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Judgment error: {0}")]
    Judgment(String),

    // Catalog errors
    #[error("Behavior not found: {0}")]
    BehaviorNotFound(String),

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using AttestError
pub type Result<T> = std::result::Result<T, AttestError>;
