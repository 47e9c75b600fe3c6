//! Dual-oracle decision for semantic checks
//!
//! Pure state machine with no I/O: given whether the page transitioned
//! since the last Act, pick the primary and rescue oracles, then fold their
//! votes into a verdict.
//!
//! - Stable page: diff oracle first, extraction oracle as rescue
//! - Transitioned page: extraction oracle first, diff oracle as rescue

use std::fmt;

/// Whether the page URL changed since the last Act step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTransition {
    Stable,
    Transitioned,
}

impl PageTransition {
    /// Compare the pre-action URL of the last Act with the current URL
    ///
    /// Fragments are ignored. Without a previous Act the page is stable.
    pub fn between(before: Option<&str>, current: &str) -> Self {
        let strip = |url: &str| url.split('#').next().unwrap_or_default().trim_end_matches('/').to_string();
        match before {
            Some(before) if strip(before) != strip(current) => PageTransition::Transitioned,
            _ => PageTransition::Stable,
        }
    }
}

/// The two judgment oracles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleKind {
    /// Before/after snapshot comparison
    Diff,
    /// Structured yes/no over visible content
    Extract,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Diff => write!(f, "diff"),
            OracleKind::Extract => write!(f, "extraction"),
        }
    }
}

/// Consultation order for one semantic check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePlan {
    pub primary: OracleKind,
    pub rescue: OracleKind,
}

pub fn plan_for(transition: PageTransition) -> OraclePlan {
    match transition {
        PageTransition::Stable => OraclePlan {
            primary: OracleKind::Diff,
            rescue: OracleKind::Extract,
        },
        PageTransition::Transitioned => OraclePlan {
            primary: OracleKind::Extract,
            rescue: OracleKind::Diff,
        },
    }
}

/// Progress of one attempt at a semantic check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Waiting on the primary oracle
    Primary(OracleKind),
    /// Primary said no; waiting on the rescue oracle
    Rescue(OracleKind),
    Passed { by: OracleKind, rescued: bool },
    Failed,
}

impl CheckState {
    pub fn start(plan: &OraclePlan) -> Self {
        CheckState::Primary(plan.primary)
    }

    /// Oracle to consult next, if the attempt is still open
    pub fn pending(&self) -> Option<OracleKind> {
        match self {
            CheckState::Primary(kind) | CheckState::Rescue(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.pending().is_none()
    }
}

/// Fold one oracle vote into the attempt state
pub fn advance(state: CheckState, plan: &OraclePlan, passed: bool) -> CheckState {
    match (state, passed) {
        (CheckState::Primary(kind), true) => CheckState::Passed { by: kind, rescued: false },
        (CheckState::Primary(_), false) => CheckState::Rescue(plan.rescue),
        (CheckState::Rescue(kind), true) => CheckState::Passed { by: kind, rescued: true },
        (CheckState::Rescue(_), false) => CheckState::Failed,
        (terminal, _) => terminal,
    }
}

/// Prompt for the extraction oracle, with interpretation rules
pub fn extraction_prompt(instruction: &str) -> String {
    format!(
        "Look at the currently visible page and decide whether this condition holds:\n\
         \"{}\"\n\n\
         Interpretation rules:\n\
         - If the condition lists alternatives joined by \"or\", it holds when any one of them holds.\n\
         - Generic wording is satisfied by any reasonable equivalent: \"navigate to X\" holds when X is shown; \
         \"create X\" holds when the new X is visible in the page.\n\
         - Visual state counts as evidence: badges, icons, colors, tooltips, strike-through and similar cues.\n\
         - Judge only what is visible now; do not assume content that is not rendered.\n\n\
         Set passed=true only if the condition holds, and explain what you saw in reasoning.",
        instruction
    )
}

/// Reasoning text for a passing verdict
pub fn pass_reasoning(plan: &OraclePlan, by: OracleKind, rescued: bool, detail: &str) -> String {
    if rescued {
        format!(
            "Passed by the {} oracle after the {} oracle reported failure (false-negative mitigation): {}",
            by, plan.primary, detail
        )
    } else {
        format!("Passed by the {} oracle: {}", by, detail)
    }
}
