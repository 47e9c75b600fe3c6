//! Instruction-following agent and judgment adapters
//!
//! The agent turns a natural-language instruction into a concrete UI action
//! (`act`) or a list of candidate elements (`observe`). The judge answers a
//! structured question about the visible page (`extract`). Both are remote,
//! non-deterministic collaborators; [`HttpAgent`] reaches them through a JSON
//! sidecar.

use async_trait::async_trait;
use attest_core::config::AgentConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{AttestError, Result};

/// Result of an agent action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl ActOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Candidate element returned by `observe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedElement {
    /// CSS selector, or `xpath=...`
    pub selector: String,
    #[serde(default)]
    pub description: String,
    /// Suggested interaction method (`click`, `selectOption`, `fill`, ...)
    #[serde(default)]
    pub method: Option<String>,
}

/// Performs and perceives UI actions from natural-language instructions
#[async_trait]
pub trait ActionAgent: Send + Sync {
    async fn act(&self, instruction: &str) -> Result<ActOutcome>;

    async fn observe(&self, instruction: Option<&str>) -> Result<Vec<ObservedElement>>;
}

/// Structured judgment over the currently visible page
#[async_trait]
pub trait Judge: Send + Sync {
    async fn extract(&self, instruction: &str, schema: &Value) -> Result<Value>;
}

/// A yes/no judgment with its rationale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub passed: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl Judgment {
    pub fn new(passed: bool, reasoning: impl Into<String>) -> Self {
        Self {
            passed,
            reasoning: reasoning.into(),
        }
    }

    /// Output shape requested from the judge: one boolean plus rationale
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "passed": { "type": "boolean" },
                "reasoning": { "type": "string" }
            },
            "required": ["passed", "reasoning"]
        })
    }

    /// Decode a judge response, reporting shape mismatches as malformed output
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| {
            AttestError::Judgment(format!(
                "Malformed structured output ({}): {}",
                e,
                truncate(&value.to_string(), 200)
            ))
        })
    }
}

/// Ask the judge a yes/no question
pub async fn judge_yes_no(judge: &dyn Judge, prompt: &str) -> Result<Judgment> {
    let value = judge.extract(prompt, &Judgment::schema()).await?;
    Judgment::from_value(value)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[derive(Debug, Deserialize)]
struct ObserveResponse {
    #[serde(default)]
    elements: Vec<ObservedElement>,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    result: Value,
}

/// Agent and judge backed by an HTTP sidecar
///
/// Endpoints: `POST /act`, `POST /observe`, `POST /extract`.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAgent {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AttestError::Agent(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Build from config, reading the optional key from the configured env var
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut agent = Self::new(&config.endpoint, Duration::from_secs(config.request_timeout_secs))?;
        agent.api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Ok(agent)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AttestError::Timeout(format!("Agent request to {} timed out", path))
            } else if e.is_connect() {
                AttestError::Agent(format!("Connection refused by agent at {}: {}", url, e))
            } else {
                AttestError::Agent(format!("Failed to send request: {}", e))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Agent sidecar rate limited (429) on {}", path);
            return Err(AttestError::Agent(format!("Rate limit exceeded (429) on {}", path)));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(AttestError::Agent(format!(
                "Agent error {} on {}: {}",
                status,
                path,
                truncate(&error_text, 500)
            )));
        }

        response.json().await.map_err(|e| {
            AttestError::Agent(format!("Malformed structured output from {}: {}", path, e))
        })
    }
}

#[async_trait]
impl ActionAgent for HttpAgent {
    #[instrument(skip(self))]
    async fn act(&self, instruction: &str) -> Result<ActOutcome> {
        self.post("/act", &json!({ "instruction": instruction })).await
    }

    #[instrument(skip(self))]
    async fn observe(&self, instruction: Option<&str>) -> Result<Vec<ObservedElement>> {
        let response: ObserveResponse = self
            .post("/observe", &json!({ "instruction": instruction }))
            .await?;
        Ok(response.elements)
    }
}

#[async_trait]
impl Judge for HttpAgent {
    #[instrument(skip(self, schema))]
    async fn extract(&self, instruction: &str, schema: &Value) -> Result<Value> {
        let response: ExtractResponse = self
            .post("/extract", &json!({ "instruction": instruction, "schema": schema }))
            .await?;
        Ok(response.result)
    }
}
