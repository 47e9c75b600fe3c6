//! Mock scenario executor for testing chain logic without a browser

use async_trait::async_trait;
use attest_core::{AttestError, Behavior, FailureContext, Result, Scenario};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::runner::{ExecutionOptions, ScenarioExecutor, ScenarioOutcome};

/// One recorded call to [`MockScenarioExecutor::execute`]
#[derive(Debug, Clone)]
pub struct Execution {
    pub behavior_id: String,
    /// The scenario as received, after credential processing
    pub scenario: Scenario,
    pub options: ExecutionOptions,
}

#[derive(Debug, Clone)]
enum Scripted {
    Fail(String),
    Crash(String),
}

/// Scripted [`ScenarioExecutor`]
///
/// Every behavior passes unless configured to fail or crash.
#[derive(Clone, Default)]
pub struct MockScenarioExecutor {
    scripted: HashMap<String, Scripted>,
    executions: Arc<Mutex<Vec<Execution>>>,
}

impl MockScenarioExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a failed scenario for `behavior_id`
    pub fn with_failure(mut self, behavior_id: &str, error: &str) -> Self {
        self.scripted
            .insert(behavior_id.to_string(), Scripted::Fail(error.to_string()));
        self
    }

    /// Return an error (a crash) for `behavior_id`
    pub fn with_crash(mut self, behavior_id: &str, error: &str) -> Self {
        self.scripted
            .insert(behavior_id.to_string(), Scripted::Crash(error.to_string()));
        self
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn executed_ids(&self) -> Vec<String> {
        self.executions().into_iter().map(|e| e.behavior_id).collect()
    }
}

#[async_trait]
impl ScenarioExecutor for MockScenarioExecutor {
    async fn execute(&self, behavior: &Behavior, scenario: &Scenario, options: ExecutionOptions) -> Result<ScenarioOutcome> {
        let session = options.session.clone();
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Execution {
                behavior_id: behavior.id.clone(),
                scenario: scenario.clone(),
                options,
            });

        match self.scripted.get(&behavior.id) {
            Some(Scripted::Crash(error)) => Err(AttestError::Browser(error.clone())),
            Some(Scripted::Fail(error)) => Ok(ScenarioOutcome {
                success: false,
                steps: Vec::new(),
                failure: Some(FailureContext {
                    instruction: scenario
                        .steps
                        .first()
                        .map(|s| s.instruction().to_string())
                        .unwrap_or_default(),
                    page_url: session.current_url.clone().unwrap_or_default(),
                    page_title: String::new(),
                    page_outline: None,
                    elements: Vec::new(),
                    error: error.clone(),
                    suggestions: Vec::new(),
                }),
                duration_ms: 0,
                session,
            }),
            None => Ok(ScenarioOutcome {
                success: true,
                steps: Vec::new(),
                failure: None,
                duration_ms: 0,
                session,
            }),
        }
    }
}
