//! Configuration management for attest
//!
//! Run-level settings: target application, retry budget, credential
//! injection window, chain cycle policy, stabilization timings, agent
//! endpoint and browser window.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{AttestError, Result};

/// Run-level attest configuration
///
/// Loaded from `.attest/config.toml` in the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestConfig {
    /// Origin of the application under test
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub credentials: CredentialConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub browser: BrowserWindowConfig,
}

/// Shared retry budget for Act steps and semantic Checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (no backoff)
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

/// Credential propagation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Number of leading Act steps eligible for credential injection
    #[serde(default = "default_injection_window")]
    pub injection_window: usize,
}

/// What to do when a dependency chain loops back on itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Fail chain construction with a `DependencyCycle` error
    #[default]
    Reject,
    /// First visit wins; the back-edge is skipped
    Tolerate,
}

impl std::str::FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "tolerate" => Ok(Self::Tolerate),
            _ => Err(format!("Invalid cycle policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
}

/// Stabilization delays and polling limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause after a click/press/tap before inspecting the page
    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,

    #[serde(default = "default_network_idle_timeout_ms")]
    pub network_idle_timeout_ms: u64,

    #[serde(default = "default_modal_poll_ms")]
    pub modal_poll_ms: u64,

    #[serde(default = "default_modal_timeout_ms")]
    pub modal_timeout_ms: u64,

    #[serde(default = "default_form_dismiss_timeout_ms")]
    pub form_dismiss_timeout_ms: u64,

    /// Wall-clock limit per behavior chain
    #[serde(default = "default_behavior_timeout_secs")]
    pub behavior_timeout_secs: u64,
}

/// Instruction-following agent sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,

    /// Environment variable holding an optional bearer key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserWindowConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

// Default value providers
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_injection_window() -> usize {
    5
}

fn default_stabilize_ms() -> u64 {
    500
}

fn default_network_idle_timeout_ms() -> u64 {
    10_000
}

fn default_modal_poll_ms() -> u64 {
    100
}

fn default_modal_timeout_ms() -> u64 {
    3000
}

fn default_form_dismiss_timeout_ms() -> u64 {
    5000
}

fn default_behavior_timeout_secs() -> u64 {
    300
}

fn default_agent_endpoint() -> String {
    "http://127.0.0.1:4545".to_string()
}

fn default_api_key_env() -> String {
    "ATTEST_AGENT_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1440
}

fn default_window_height() -> u32 {
    900
}

impl AttestConfig {
    /// Load configuration from `.attest/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".attest/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| AttestError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.attest/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".attest");
        std::fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| AttestError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_dir.join("config.toml"), content)?;
        Ok(())
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl TimingConfig {
    pub fn stabilize(&self) -> Duration {
        Duration::from_millis(self.stabilize_ms)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    pub fn modal_poll(&self) -> Duration {
        Duration::from_millis(self.modal_poll_ms)
    }

    pub fn modal_timeout(&self) -> Duration {
        Duration::from_millis(self.modal_timeout_ms)
    }

    pub fn form_dismiss_timeout(&self) -> Duration {
        Duration::from_millis(self.form_dismiss_timeout_ms)
    }

    pub fn behavior_timeout(&self) -> Duration {
        Duration::from_secs(self.behavior_timeout_secs)
    }

    /// Zero-delay timings for tests driven by mocks
    pub fn immediate() -> Self {
        Self {
            stabilize_ms: 0,
            network_idle_timeout_ms: 0,
            modal_poll_ms: 0,
            modal_timeout_ms: 0,
            form_dismiss_timeout_ms: 0,
            behavior_timeout_secs: default_behavior_timeout_secs(),
        }
    }
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            retry: RetryConfig::default(),
            credentials: CredentialConfig::default(),
            chain: ChainConfig::default(),
            timing: TimingConfig::default(),
            agent: AgentConfig::default(),
            browser: BrowserWindowConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            injection_window: default_injection_window(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stabilize_ms: default_stabilize_ms(),
            network_idle_timeout_ms: default_network_idle_timeout_ms(),
            modal_poll_ms: default_modal_poll_ms(),
            modal_timeout_ms: default_modal_timeout_ms(),
            form_dismiss_timeout_ms: default_form_dismiss_timeout_ms(),
            behavior_timeout_secs: default_behavior_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for BrowserWindowConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}
