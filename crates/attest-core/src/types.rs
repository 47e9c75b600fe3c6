//! Core type definitions for behavior verification

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::classify;
use crate::{AttestError, Result};

/// Derive a behavior or scenario identity from display text
///
/// Lower-cases, collapses every run of non-alphanumeric characters into a
/// single hyphen and trims hyphens from both ends.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Reference from one behavior to a prerequisite behavior
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Identity of the referenced behavior
    pub behavior: String,
    /// Optional scenario identity to run instead of the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

impl DependencyRef {
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            scenario: None,
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Parse `<BehaviorTitle>[: <scenario name>]`, with an optional `N.` list prefix
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let without_number = match trimmed.split_once(". ") {
            Some((prefix, rest)) if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => trimmed,
        };

        let (title, scenario) = match without_number.split_once(':') {
            Some((title, scenario)) => (title, Some(scenario)),
            None => (without_number, None),
        };

        let behavior = slugify(title);
        if behavior.is_empty() {
            return Err(AttestError::Catalog(format!(
                "Invalid dependency reference: {:?}",
                text
            )));
        }

        let scenario = scenario.map(slugify).filter(|s| !s.is_empty());
        Ok(Self { behavior, scenario })
    }
}

impl std::fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scenario {
            Some(scenario) => write!(f, "{}: {}", self.behavior, scenario),
            None => write!(f, "{}", self.behavior),
        }
    }
}

/// How a Check step is resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Resolvable by literal page inspection
    Deterministic,
    /// Requires a judgment oracle
    #[default]
    Semantic,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deterministic => write!(f, "deterministic"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// A single Act or Check step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Act {
        instruction: String,
        line: u32,
    },
    Check {
        instruction: String,
        line: u32,
        kind: CheckKind,
    },
}

impl Step {
    pub fn act(instruction: impl Into<String>, line: u32) -> Self {
        Self::Act {
            instruction: instruction.into(),
            line,
        }
    }

    /// Create a Check step, classifying its instruction
    pub fn check(instruction: impl Into<String>, line: u32) -> Self {
        let instruction = instruction.into();
        let kind = classify(&instruction);
        Self::Check {
            instruction,
            line,
            kind,
        }
    }

    /// Parse a `* Act: ...` / `* Check: ...` step line
    pub fn parse_line(text: &str, line: u32) -> Result<Self> {
        let body = text
            .trim()
            .trim_start_matches(|c: char| c == '*' || c == '-')
            .trim_start();

        let (keyword, instruction) = body.split_once(':').ok_or_else(|| {
            AttestError::Catalog(format!("Line {}: expected 'Act:' or 'Check:' in {:?}", line, text))
        })?;

        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(AttestError::Catalog(format!("Line {}: empty instruction", line)));
        }

        match keyword.trim().to_lowercase().as_str() {
            "act" => Ok(Self::act(instruction, line)),
            "check" => Ok(Self::check(instruction, line)),
            other => Err(AttestError::Catalog(format!(
                "Line {}: unknown step keyword {:?}",
                line, other
            ))),
        }
    }

    pub fn instruction(&self) -> &str {
        match self {
            Self::Act { instruction, .. } | Self::Check { instruction, .. } => instruction,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Self::Act { line, .. } | Self::Check { line, .. } => *line,
        }
    }

    pub fn is_act(&self) -> bool {
        matches!(self, Self::Act { .. })
    }

    /// Copy of this step with a substituted instruction
    pub fn with_instruction(&self, instruction: impl Into<String>) -> Self {
        match self {
            Self::Act { line, .. } => Self::Act {
                instruction: instruction.into(),
                line: *line,
            },
            Self::Check { line, kind, .. } => Self::Check {
                instruction: instruction.into(),
                line: *line,
                kind: *kind,
            },
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Act { instruction, .. } => write!(f, "Act: {}", instruction),
            Self::Check { instruction, .. } => write!(f, "Check: {}", instruction),
        }
    }
}

/// One concrete ordered sequence of steps realizing a behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        let name = name.into();
        Self {
            id: slugify(&name),
            name,
            steps,
        }
    }

    /// Copy with the given steps, keeping identity
    pub fn with_steps(&self, steps: Vec<Step>) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            steps,
        }
    }
}

/// A named, independently verifiable capability of the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub page_path: Option<String>,
}

impl Behavior {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: slugify(&title),
            title,
            description: String::new(),
            dependencies: Vec::new(),
            scenarios: Vec::new(),
            page_path: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyRef) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_page_path(mut self, path: impl Into<String>) -> Self {
        self.page_path = Some(path.into());
        self
    }

    /// Select a scenario by identity, or the first scenario when none is named
    pub fn scenario(&self, name: Option<&str>) -> Option<&Scenario> {
        match name {
            Some(name) => {
                let wanted = slugify(name);
                self.scenarios.iter().find(|s| s.id == wanted)
            }
            None => self.scenarios.first(),
        }
    }
}

/// Outcome of an Act step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActResult {
    pub success: bool,
    pub duration_ms: u64,
    /// Page URL after a successful action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_snapshot: Option<String>,
    /// Actions observable on the page when the step failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_actions: Vec<String>,
}

impl ActResult {
    pub fn succeeded(duration: Duration, page_url: impl Into<String>) -> Self {
        Self {
            success: true,
            duration_ms: duration.as_millis() as u64,
            page_url: Some(page_url.into()),
            error: None,
            page_snapshot: None,
            available_actions: Vec::new(),
        }
    }

    pub fn failed(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms: duration.as_millis() as u64,
            page_url: None,
            error: Some(error.into()),
            page_snapshot: None,
            available_actions: Vec::new(),
        }
    }
}

/// Outcome of a Check step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub kind: CheckKind,
    /// The expected condition (the instruction text)
    pub expected: String,
    /// Observation or evaluator explanation
    pub actual: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CheckResult {
    pub fn new(success: bool, kind: CheckKind, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            success,
            kind,
            expected: expected.into(),
            actual: actual.into(),
            reasoning: None,
            suggestion: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Act or Check outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    Act(ActResult),
    Check(CheckResult),
}

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: Step,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn act(step: Step, result: ActResult) -> Self {
        Self {
            step,
            outcome: StepOutcome::Act(result),
        }
    }

    pub fn check(step: Step, result: CheckResult) -> Self {
        Self {
            step,
            outcome: StepOutcome::Check(result),
        }
    }

    pub fn success(&self) -> bool {
        match &self.outcome {
            StepOutcome::Act(r) => r.success,
            StepOutcome::Check(r) => r.success,
        }
    }

    /// Human-readable failure description, if the step failed
    pub fn failure_message(&self) -> Option<String> {
        match &self.outcome {
            StepOutcome::Act(r) if !r.success => Some(format!(
                "{} failed: {}",
                self.step,
                r.error.as_deref().unwrap_or("unknown error")
            )),
            StepOutcome::Check(r) if !r.success => Some(format!(
                "{} failed ({}): expected {:?}, observed {:?}",
                self.step, r.kind, r.expected, r.actual
            )),
            _ => None,
        }
    }
}

/// Behavior outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorStatus {
    Pass,
    Fail,
    DependencyFailed,
}

impl std::fmt::Display for BehaviorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::DependencyFailed => write!(f, "dependency_failed"),
        }
    }
}

/// Outcome record for one behavior in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorContext {
    pub behavior_id: String,
    pub title: String,
    pub status: BehaviorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_dependency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl BehaviorContext {
    pub fn passed(behavior: &Behavior, duration: Duration) -> Self {
        Self {
            behavior_id: behavior.id.clone(),
            title: behavior.title.clone(),
            status: BehaviorStatus::Pass,
            failed_dependency: None,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(behavior: &Behavior, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            behavior_id: behavior.id.clone(),
            title: behavior.title.clone(),
            status: BehaviorStatus::Fail,
            failed_dependency: None,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn dependency_failed(
        behavior: &Behavior,
        dependency: impl Into<String>,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        Self {
            behavior_id: behavior.id.clone(),
            title: behavior.title.clone(),
            status: BehaviorStatus::DependencyFailed,
            failed_dependency: Some(dependency.into()),
            error,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == BehaviorStatus::Pass
    }
}

/// Most recently captured registration credentials; `None` means not yet captured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl CredentialSet {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none()
    }

    /// Both values present, enough to sign in
    pub fn is_complete(&self) -> bool {
        self.email.is_some() && self.password.is_some()
    }
}

/// A visible dialog/overlay and its best-guess confirm control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalDetection {
    pub modal_selector: String,
    #[serde(default)]
    pub confirm_selector: Option<String>,
}

/// A Check resolvable by direct page inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum DeterministicCheck {
    UrlContains { expected: String },
    UrlIs { expected: String },
    TitleIs { expected: String },
    TitleContains { expected: String },
    ElementCount { target: String, count: usize },
    InputValue { field: String, expected: String },
    Checkbox { field: Option<String>, checked: bool },
}

/// HTML element attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttribute {
    pub name: String,
    pub value: String,
}

/// A visible interactive element listed in diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    /// Tag or role (button, input, a, select, ...)
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub selector: String,
    #[serde(default)]
    pub attributes: Vec<ElementAttribute>,
}

/// Diagnostics bundle attached to a final step failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    pub instruction: String,
    pub page_url: String,
    #[serde(default)]
    pub page_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_outline: Option<String>,
    #[serde(default)]
    pub elements: Vec<InteractiveElement>,
    pub error: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl std::fmt::Display for FailureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Step failed: {}", self.instruction)?;
        writeln!(f, "  Page: {} ({})", self.page_url, self.page_title)?;
        writeln!(f, "  Error: {}", self.error)?;
        for suggestion in &self.suggestions {
            writeln!(f, "  Hint: {}", suggestion)?;
        }
        Ok(())
    }
}
