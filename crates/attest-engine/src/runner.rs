//! Scenario and behavior runners
//!
//! [`ScenarioRunner`] prepares the session for one chain member and runs its
//! steps in order, halting on the first failure. [`BehaviorRunner`] walks the
//! dependency chain of a target behavior, feeding each member through a
//! [`ScenarioExecutor`] and folding the outcomes into one verdict.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use attest_browser::capture_failure;
use attest_core::fail_open::fail_open_or;
use attest_core::{
    AttestConfig, Behavior, BehaviorContext, BehaviorStatus, Catalog, CredentialSet, FailureContext, Result,
    Scenario, StepResult,
};
use tracing::{debug, info, warn};

use crate::chain::build_chain;
use crate::context::VerificationContext;
use crate::credentials::CredentialTracker;
use crate::executor::{Adapters, StepExecutor, StepRuntime};
use crate::session::{is_parameterized, SessionManager, SessionPolicy, SessionState};

/// How to run one chain member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Hard-reset the session first (first chain member only)
    pub clear_session: bool,
    /// Page to soft-navigate to before the first step
    pub navigate_to: Option<String>,
    /// Credentials available for sign-in recovery
    pub credentials: CredentialSet,
    pub session: SessionState,
}

/// Result of running one scenario
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub success: bool,
    pub steps: Vec<StepResult>,
    /// Diagnostics for the failing step
    pub failure: Option<FailureContext>,
    pub duration_ms: u64,
    /// Session facts after the scenario
    pub session: SessionState,
}

impl ScenarioOutcome {
    pub fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        self.steps
            .iter()
            .find_map(|step| step.failure_message())
            .or_else(|| self.failure.as_ref().map(|f| f.error.clone()))
    }
}

/// Runs a scenario for a behavior
///
/// An `Err` is a crash: the scenario could not be run to a verdict.
#[async_trait]
pub trait ScenarioExecutor: Send + Sync {
    async fn execute(&self, behavior: &Behavior, scenario: &Scenario, options: ExecutionOptions) -> Result<ScenarioOutcome>;
}

/// [`ScenarioExecutor`] over live adapters
pub struct ScenarioRunner {
    adapters: Adapters,
    config: AttestConfig,
}

impl ScenarioRunner {
    pub fn new(adapters: Adapters, config: AttestConfig) -> Self {
        Self { adapters, config }
    }
}

#[async_trait]
impl ScenarioExecutor for ScenarioRunner {
    async fn execute(&self, behavior: &Behavior, scenario: &Scenario, options: ExecutionOptions) -> Result<ScenarioOutcome> {
        let started = Instant::now();
        let page = self.adapters.page.as_ref();

        let policy = SessionPolicy::select(options.clear_session, options.navigate_to.as_deref());
        debug!("{}: session policy {:?}", behavior.id, policy);
        let manager = SessionManager::new(page, self.adapters.agent.as_ref(), &self.config.timing);
        let session = manager.apply(&policy, options.session, &options.credentials).await?;

        let executor = StepExecutor::new(&self.adapters, &self.config);
        let mut runtime = StepRuntime::default();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut failure = None;

        for step in &scenario.steps {
            let (result, next) = executor.run_step(step, runtime).await;
            runtime = next;
            let message = result.failure_message();
            steps.push(result);

            if let Some(message) = message {
                warn!("{}: {}", behavior.id, message);
                failure = Some(capture_failure(page, step.instruction(), &message).await);
                break;
            }
        }

        let url = fail_open_or("read_url", String::new(), || page.current_url()).await;
        let success = failure.is_none();
        info!(
            "{} / {}: {} ({} of {} steps run)",
            behavior.id,
            scenario.id,
            if success { "passed" } else { "failed" },
            steps.len(),
            scenario.steps.len()
        );

        Ok(ScenarioOutcome {
            success,
            steps,
            failure,
            duration_ms: started.elapsed().as_millis() as u64,
            session: session.at(url),
        })
    }
}

/// Result for an id with no behavior behind it
pub(crate) fn unresolved(behavior_id: &str, error: impl Into<String>) -> BehaviorContext {
    BehaviorContext {
        behavior_id: behavior_id.to_string(),
        title: behavior_id.to_string(),
        status: BehaviorStatus::Fail,
        failed_dependency: None,
        error: Some(error.into()),
        duration_ms: 0,
    }
}

/// Runs a behavior together with its dependency chain
pub struct BehaviorRunner {
    config: AttestConfig,
}

impl BehaviorRunner {
    pub fn new(config: AttestConfig) -> Self {
        Self { config }
    }

    /// Verify `target`, recording the verdict in `context`
    pub async fn run(
        &self,
        target: &str,
        catalog: &Catalog,
        context: &mut VerificationContext,
        credentials: &mut CredentialTracker,
        executor: &dyn ScenarioExecutor,
    ) -> BehaviorContext {
        let result = self.run_chain(target, catalog, context, credentials, executor).await;
        info!("{}: {:?}", result.behavior_id, result.status);
        context.record(result.clone());
        result
    }

    async fn run_chain(
        &self,
        target: &str,
        catalog: &Catalog,
        context: &mut VerificationContext,
        credentials: &mut CredentialTracker,
        executor: &dyn ScenarioExecutor,
    ) -> BehaviorContext {
        let started = Instant::now();

        let Some(behavior) = catalog.get(target) else {
            return unresolved(target, format!("Behavior not found: {}", target));
        };

        if let Some(dependency) = context.failed_dependency(behavior) {
            info!(
                "{}: dependency {} already {:?}, not running",
                behavior.id, dependency.behavior_id, dependency.status
            );
            return BehaviorContext::dependency_failed(
                behavior,
                dependency.behavior_id.clone(),
                Some(format!("Dependency '{}' did not pass", dependency.behavior_id)),
                Duration::ZERO,
            );
        }

        let chain = match build_chain(target, catalog, self.config.chain.cycle_policy) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("{}: cannot build dependency chain: {}", behavior.id, e);
                return BehaviorContext::failed(behavior, e.to_string(), started.elapsed());
            }
        };

        let mut session = SessionState::new(self.config.base_url.clone());
        for (index, link) in chain.iter().enumerate() {
            let Some(member) = catalog.get(&link.behavior_id) else {
                return BehaviorContext::failed(
                    behavior,
                    format!("Behavior not found: {}", link.behavior_id),
                    started.elapsed(),
                );
            };

            let failure = match member.scenario(link.scenario.as_deref()) {
                None => Some(match &link.scenario {
                    Some(name) => format!("{} has no scenario named '{}'", member.id, name),
                    None => format!("{} has no scenarios", member.id),
                }),
                Some(scenario) => {
                    let processed =
                        credentials.process_scenario(&member.id, scenario, self.config.credentials.injection_window);
                    let navigate_to = if index == 0 {
                        None
                    } else {
                        member.page_path.clone().filter(|path| !is_parameterized(path))
                    };
                    let options = ExecutionOptions {
                        clear_session: index == 0,
                        navigate_to,
                        credentials: credentials.credentials().clone(),
                        session: session.clone(),
                    };

                    info!("Chain {}/{}: {} ({})", index + 1, chain.len(), member.id, processed.id);
                    match executor.execute(member, &processed, options).await {
                        Ok(outcome) => {
                            session = outcome.session.clone();
                            if CredentialTracker::is_signup(&member.id) {
                                credentials.harvest(&processed);
                            }
                            if outcome.success {
                                None
                            } else {
                                Some(outcome.error_message().unwrap_or_else(|| "Scenario failed".to_string()))
                            }
                        }
                        Err(e) => Some(format!("Execution crashed: {}", e)),
                    }
                }
            };

            if let Some(error) = failure {
                return if member.id == behavior.id {
                    BehaviorContext::failed(behavior, error, started.elapsed())
                } else {
                    warn!("{}: dependency {} failed: {}", behavior.id, member.id, error);
                    if !context.contains(&member.id) {
                        context.record(BehaviorContext::failed(member, error.clone(), started.elapsed()));
                    }
                    BehaviorContext::dependency_failed(
                        behavior,
                        member.id.clone(),
                        Some(format!("Dependency '{}' failed: {}", member.id, error)),
                        started.elapsed(),
                    )
                };
            }
        }

        BehaviorContext::passed(behavior, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockScenarioExecutor;
    use attest_browser::testing::{MockAgent, MockDiffOracle, MockJudge, MockPage};
    use attest_core::config::TimingConfig;
    use attest_core::{DependencyRef, Step};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    fn config() -> AttestConfig {
        let mut config = AttestConfig::default();
        config.retry.delay_ms = 0;
        config.timing = TimingConfig::immediate();
        config
    }

    fn tracker() -> CredentialTracker {
        CredentialTracker::with_counter(Arc::new(AtomicU64::new(0)))
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Behavior::new("Sign Up").with_scenario(Scenario::new(
                "default",
                vec![
                    Step::act("Type 'ada@test.com' into the email field", 1),
                    Step::act("Type 'pw123' into the password field", 2),
                    Step::act("Click 'Create account'", 3),
                ],
            )),
            Behavior::new("Add Task")
                .with_dependency(DependencyRef::new("sign-up"))
                .with_page_path("/tasks")
                .with_scenario(Scenario::new(
                    "default",
                    vec![
                        Step::act("Type 'someone@else.com' into the email field", 1),
                        Step::check("The task appears in the list", 2),
                    ],
                )),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_chain_options_and_credentials() {
        let catalog = catalog();
        let executor = MockScenarioExecutor::new();
        let mut context = VerificationContext::new();
        let mut credentials = tracker();

        let result = BehaviorRunner::new(config())
            .run("add-task", &catalog, &mut context, &mut credentials, &executor)
            .await;
        assert!(result.is_pass());

        let runs = executor.executions();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].behavior_id, "sign-up");
        assert!(runs[0].options.clear_session);
        assert!(runs[0].options.navigate_to.is_none());
        assert!(!runs[1].options.clear_session);
        assert_eq!(runs[1].options.navigate_to.as_deref(), Some("/tasks"));

        // Sign-up typed a uniquified email, which the next member received
        assert_eq!(credentials.credentials().email.as_deref(), Some("ada_1@test.com"));
        assert_eq!(runs[1].options.credentials.email.as_deref(), Some("ada_1@test.com"));
        assert_eq!(
            runs[1].scenario.steps[0].instruction(),
            "Type 'ada_1@test.com' into the email field"
        );
        assert_eq!(context.get("add-task").map(|r| r.is_pass()), Some(true));
    }

    #[tokio::test]
    async fn test_failed_member_marks_dependency_failure() {
        let catalog = catalog();
        let executor = MockScenarioExecutor::new().with_failure("sign-up", "Email already taken");
        let mut context = VerificationContext::new();
        let mut credentials = tracker();

        let result = BehaviorRunner::new(config())
            .run("add-task", &catalog, &mut context, &mut credentials, &executor)
            .await;

        assert_eq!(result.status, BehaviorStatus::DependencyFailed);
        assert_eq!(result.failed_dependency.as_deref(), Some("sign-up"));
        assert!(result.error.unwrap_or_default().contains("Email already taken"));
        assert_eq!(executor.executions().len(), 1);
        assert_eq!(context.get("sign-up").map(|r| r.status), Some(BehaviorStatus::Fail));
    }

    #[tokio::test]
    async fn test_target_crash_is_a_failure() {
        let catalog = catalog();
        let executor = MockScenarioExecutor::new().with_crash("add-task", "browser went away");
        let mut context = VerificationContext::new();
        let mut credentials = tracker();

        let result = BehaviorRunner::new(config())
            .run("add-task", &catalog, &mut context, &mut credentials, &executor)
            .await;

        assert_eq!(result.status, BehaviorStatus::Fail);
        assert!(result.error.unwrap_or_default().contains("browser went away"));
    }

    #[tokio::test]
    async fn test_missing_target() {
        let executor = MockScenarioExecutor::new();
        let mut context = VerificationContext::new();
        let mut credentials = tracker();

        let result = BehaviorRunner::new(config())
            .run("nope", &catalog(), &mut context, &mut credentials, &executor)
            .await;
        assert_eq!(result.status, BehaviorStatus::Fail);
        assert!(executor.executions().is_empty());
        assert!(context.contains("nope"));
    }

    #[tokio::test]
    async fn test_scenario_runner_halts_on_first_failure() {
        let page = Arc::new(MockPage::new("http://localhost:3000/"));
        let agent = MockAgent::new().with_act_results("ghost", vec![Err("Could not find element".into())]);
        let adapters = Adapters::new(
            page.clone(),
            Arc::new(agent),
            Arc::new(MockJudge::new()),
            Arc::new(MockDiffOracle::new()),
        );
        let runner = ScenarioRunner::new(adapters, config());
        let behavior = Behavior::new("Ghost");
        let scenario = Scenario::new(
            "default",
            vec![
                Step::act("Click the ghost button", 1),
                Step::check("URL contains /", 2),
            ],
        );
        let options = ExecutionOptions {
            clear_session: true,
            navigate_to: None,
            credentials: CredentialSet::default(),
            session: SessionState::new("http://localhost:3000"),
        };

        let outcome = runner.execute(&behavior, &scenario, options).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.session.hard_resets, 1);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.instruction, "Click the ghost button");
        assert!(outcome.error_message().unwrap().contains("Could not find element"));
    }
}
