//! Credential propagation across a dependency chain
//!
//! A sign-up behavior types fresh credentials; later behaviors in the same
//! chain reuse them. Generated emails carry a numeric suffix from a counter
//! that only ever grows, so repeated attempts never collide on identity.

use attest_core::{CredentialSet, Scenario, Step};
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Which credential a typed value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Email,
    Password,
}

impl CredentialField {
    /// Classify a destination field description by keyword
    pub fn from_description(description: &str) -> Option<Self> {
        let lower = description.to_lowercase();
        if lower.contains("password") || lower.contains("passphrase") {
            Some(Self::Password)
        } else if lower.contains("email") || lower.contains("e-mail") {
            Some(Self::Email)
        } else {
            None
        }
    }
}

/// A matched "type 'X' into the <field>" instruction
struct TypedValue<'a> {
    caps: Captures<'a>,
}

impl<'a> TypedValue<'a> {
    fn parse(instruction: &'a str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(
                r#"(?i)^(?P<verb>\s*(?:type|enter|input|fill\s+in)\s+)(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)")(?P<rest>\s+(?:into|in)\s+(?:the\s+)?(?P<field>.+))$"#,
            )
            .expect("valid typed-value pattern")
        });
        pattern.captures(instruction).map(|caps| Self { caps })
    }

    fn value(&self) -> &str {
        self.caps
            .name("sq")
            .or_else(|| self.caps.name("dq"))
            .map(|m| m.as_str())
            .unwrap_or_default()
    }

    fn quote(&self) -> char {
        if self.caps.name("sq").is_some() {
            '\''
        } else {
            '"'
        }
    }

    fn field(&self) -> Option<CredentialField> {
        self.caps
            .name("field")
            .and_then(|m| CredentialField::from_description(m.as_str()))
    }

    /// Rebuild the instruction with a new value, keeping the original quote style
    fn replace_value(&self, value: &str) -> String {
        let quote = self.quote();
        format!(
            "{}{}{}{}{}",
            &self.caps["verb"],
            quote,
            value,
            quote,
            &self.caps["rest"]
        )
    }
}

fn global_counter() -> Arc<AtomicU64> {
    static COUNTER: OnceLock<Arc<AtomicU64>> = OnceLock::new();
    COUNTER.get_or_init(|| Arc::new(AtomicU64::new(0))).clone()
}

/// Tracks credentials captured from sign-up steps and injects them later
#[derive(Debug, Clone)]
pub struct CredentialTracker {
    credentials: CredentialSet,
    counter: Arc<AtomicU64>,
}

impl Default for CredentialTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialTracker {
    /// Tracker sharing the process-wide identity counter
    pub fn new() -> Self {
        Self::with_counter(global_counter())
    }

    /// Tracker with its own identity counter
    pub fn with_counter(counter: Arc<AtomicU64>) -> Self {
        Self {
            credentials: CredentialSet::default(),
            counter,
        }
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Forget captured values; the identity counter keeps counting
    pub fn reset(&mut self) {
        self.credentials = CredentialSet::default();
    }

    /// Record the value typed by an instruction into an email or password field
    ///
    /// Returns true when something was captured.
    pub fn capture_from_step(&mut self, instruction: &str) -> bool {
        let Some(typed) = TypedValue::parse(instruction) else {
            return false;
        };
        match typed.field() {
            Some(CredentialField::Email) => {
                debug!("Captured email credential");
                self.credentials.email = Some(typed.value().to_string());
                true
            }
            Some(CredentialField::Password) => {
                debug!("Captured password credential");
                self.credentials.password = Some(typed.value().to_string());
                true
            }
            None => false,
        }
    }

    /// Substitute the tracked value for the one an instruction types
    ///
    /// Instructions whose field has no tracked value are returned unchanged.
    pub fn inject_into_step(&self, instruction: &str) -> String {
        let Some(typed) = TypedValue::parse(instruction) else {
            return instruction.to_string();
        };
        let tracked = match typed.field() {
            Some(CredentialField::Email) => self.credentials.email.as_deref(),
            Some(CredentialField::Password) => self.credentials.password.as_deref(),
            None => None,
        };
        match tracked {
            Some(value) => typed.replace_value(value),
            None => instruction.to_string(),
        }
    }

    /// Append the next identity number before the `@`
    pub fn uniquify_email(&self, email: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        match email.split_once('@') {
            Some((local, domain)) => format!("{}_{}@{}", local, n, domain),
            None => format!("{}_{}", email, n),
        }
    }

    /// Behaviors that register a new account
    pub fn is_signup(behavior_id: &str) -> bool {
        ["sign-up", "signup", "register", "registration", "create-account"]
            .iter()
            .any(|k| behavior_id.contains(k))
    }

    /// Behaviors that deliberately use wrong credentials
    pub fn is_invalid_credential_test(behavior_id: &str) -> bool {
        ["invalid", "wrong", "incorrect", "bad-credentials", "bad-password"]
            .iter()
            .any(|k| behavior_id.contains(k))
    }

    /// Produce the credential-processed copy of a scenario for one execution
    ///
    /// Sign-up behaviors get their own email uniquified. Invalid-credential
    /// tests are left alone. Everything else receives tracked values in at
    /// most the first `window` Act steps.
    pub fn process_scenario(&self, behavior_id: &str, scenario: &Scenario, window: usize) -> Scenario {
        if Self::is_invalid_credential_test(behavior_id) {
            debug!("{}: invalid-credential test, no injection", behavior_id);
            return scenario.clone();
        }

        if Self::is_signup(behavior_id) {
            let steps = scenario
                .steps
                .iter()
                .map(|step| match TypedValue::parse(step.instruction()) {
                    Some(typed) if step.is_act() && typed.field() == Some(CredentialField::Email) => {
                        let unique = self.uniquify_email(typed.value());
                        debug!("{}: sign-up email uniquified to {}", behavior_id, unique);
                        step.with_instruction(typed.replace_value(&unique))
                    }
                    _ => step.clone(),
                })
                .collect();
            return scenario.with_steps(steps);
        }

        if !self.has_credentials() {
            return scenario.clone();
        }

        let mut acts_seen = 0;
        let steps = scenario
            .steps
            .iter()
            .map(|step| {
                if !step.is_act() {
                    return step.clone();
                }
                acts_seen += 1;
                if acts_seen > window {
                    return step.clone();
                }
                let injected = self.inject_into_step(step.instruction());
                if injected != step.instruction() {
                    debug!("{}: injected credentials at line {}", behavior_id, step.line());
                }
                step.with_instruction(injected)
            })
            .collect::<Vec<Step>>();
        scenario.with_steps(steps)
    }

    /// Capture credentials from every Act step of an executed scenario
    pub fn harvest(&mut self, scenario: &Scenario) {
        for step in scenario.steps.iter().filter(|s| s.is_act()) {
            self.capture_from_step(step.instruction());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> CredentialTracker {
        CredentialTracker::with_counter(Arc::new(AtomicU64::new(0)))
    }

    fn login_scenario() -> Scenario {
        Scenario::new(
            "default",
            vec![
                Step::act("Navigate to /login", 1),
                Step::act("Type 'placeholder@test.com' into the email field", 2),
                Step::act("Type \"secret\" into the password field", 3),
                Step::act("Click 'Sign in'", 4),
                Step::check("The dashboard is shown", 5),
            ],
        )
    }

    #[test]
    fn test_uniquify_is_monotonic_across_resets() {
        let mut tracker = isolated();
        let mut emails = Vec::new();
        for _ in 0..3 {
            emails.push(tracker.uniquify_email("user@test.com"));
            tracker.reset();
        }
        assert_eq!(emails, vec!["user_1@test.com", "user_2@test.com", "user_3@test.com"]);
    }

    #[test]
    fn test_capture_routes_by_field() {
        let mut tracker = isolated();
        assert!(tracker.capture_from_step("Type 'ada@test.com' into the Email Address field"));
        assert!(tracker.capture_from_step("Enter \"hunter2\" in the password input"));
        assert!(!tracker.capture_from_step("Type 'Ada' into the name field"));

        assert_eq!(tracker.credentials().email.as_deref(), Some("ada@test.com"));
        assert_eq!(tracker.credentials().password.as_deref(), Some("hunter2"));

        tracker.reset();
        assert!(!tracker.has_credentials());
    }

    #[test]
    fn test_inject_preserves_quote_style_and_field() {
        let mut tracker = isolated();
        tracker.capture_from_step("Type 'ada@test.com' into the email field");

        assert_eq!(
            tracker.inject_into_step("Type \"old@test.com\" into the email field"),
            "Type \"ada@test.com\" into the email field"
        );
        // Email-only state leaves password steps alone
        assert_eq!(
            tracker.inject_into_step("Type 'secret' into the password field"),
            "Type 'secret' into the password field"
        );
        assert_eq!(tracker.inject_into_step("Click 'Sign in'"), "Click 'Sign in'");
    }

    #[test]
    fn test_signup_uniquifies_own_email() {
        let mut tracker = isolated();
        tracker.capture_from_step("Type 'tracked@test.com' into the email field");

        let processed = tracker.process_scenario("sign-up", &login_scenario(), 5);
        assert_eq!(
            processed.steps[1].instruction(),
            "Type 'placeholder_1@test.com' into the email field"
        );
        assert_eq!(processed.steps[2].instruction(), "Type \"secret\" into the password field");
    }

    #[test]
    fn test_invalid_credentials_receive_no_injection() {
        let mut tracker = isolated();
        tracker.capture_from_step("Type 'ada@test.com' into the email field");
        tracker.capture_from_step("Type 'pw' into the password field");

        let original = login_scenario();
        let processed = tracker.process_scenario("sign-in-with-invalid-credentials", &original, 5);
        assert_eq!(processed, original);
    }

    #[test]
    fn test_injection_window_counts_act_steps() {
        let mut tracker = isolated();
        tracker.capture_from_step("Type 'ada@test.com' into the email field");

        let scenario = Scenario::new(
            "late",
            vec![
                Step::act("Navigate to /login", 1),
                Step::check("A form is shown", 2),
                Step::act("Type 'x@test.com' into the email field", 3),
                Step::act("Click 'Invite'", 4),
                Step::act("Type 'y@test.com' into the email field", 5),
            ],
        );

        let processed = tracker.process_scenario("invite-member", &scenario, 2);
        assert_eq!(processed.steps[2].instruction(), "Type 'ada@test.com' into the email field");
        assert_eq!(processed.steps[4].instruction(), "Type 'y@test.com' into the email field");
        // The source scenario is never mutated
        assert_eq!(scenario.steps[2].instruction(), "Type 'x@test.com' into the email field");
    }

    #[test]
    fn test_harvest_captures_processed_values() {
        let mut tracker = isolated();
        let processed = tracker.process_scenario("sign-up", &login_scenario(), 5);
        tracker.harvest(&processed);

        assert_eq!(tracker.credentials().email.as_deref(), Some("placeholder_1@test.com"));
        assert_eq!(tracker.credentials().password.as_deref(), Some("secret"));
        assert!(tracker.credentials().is_complete());
    }
}
