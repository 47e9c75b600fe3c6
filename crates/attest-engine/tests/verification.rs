//! End-to-end engine behavior against mock adapters

use std::sync::Arc;

use attest_browser::testing::{CallLog, MockAgent, MockDiffOracle, MockJudge, MockPage};
use attest_core::config::TimingConfig;
use attest_core::{
    AttestConfig, Behavior, BehaviorContext, BehaviorStatus, Catalog, CheckKind, CyclePolicy, DependencyRef,
    Scenario, Step, StepOutcome, StepResult,
};
use attest_engine::testing::MockScenarioExecutor;
use attest_engine::{
    build_chain, Adapters, BehaviorRunner, CredentialTracker, ScenarioRunner, StepExecutor, StepRuntime,
    VerificationContext,
};
use std::sync::atomic::AtomicU64;
use std::time::Duration;

const BASE: &str = "http://localhost:3000";

fn config() -> AttestConfig {
    let mut config = AttestConfig::default();
    config.base_url = BASE.to_string();
    config.retry.delay_ms = 0;
    config.timing = TimingConfig::immediate();
    config
}

struct Rig {
    log: CallLog,
    adapters: Adapters,
}

fn rig(page: MockPage, agent: MockAgent, judge: MockJudge, oracle: MockDiffOracle) -> Rig {
    let log = CallLog::new();
    let adapters = Adapters::new(
        Arc::new(page.with_log(log.clone())),
        Arc::new(agent.with_log(log.clone())),
        Arc::new(judge.with_log(log.clone())),
        Arc::new(oracle.with_log(log.clone())),
    );
    Rig { log, adapters }
}

async fn check(rig: &Rig, instruction: &str, runtime: StepRuntime) -> StepResult {
    let config = config();
    let executor = StepExecutor::new(&rig.adapters, &config);
    let (result, _) = executor.run_step(&Step::check(instruction, 1), runtime).await;
    result
}

fn check_outcome(result: &StepResult) -> &attest_core::CheckResult {
    match &result.outcome {
        StepOutcome::Check(check) => check,
        other => panic!("expected a check outcome, got {:?}", other),
    }
}

fn tracker() -> CredentialTracker {
    CredentialTracker::with_counter(Arc::new(AtomicU64::new(0)))
}

// ---- Dual-oracle consensus ----

#[tokio::test]
async fn test_extraction_rescues_diff_rejection_on_stable_page() {
    let rig = rig(
        MockPage::new(format!("{}/tasks", BASE)),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(true)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(false)]),
    );

    let result = check(&rig, "A success notification appears", StepRuntime::default()).await;
    let outcome = check_outcome(&result);

    assert!(outcome.success);
    assert_eq!(outcome.kind, CheckKind::Semantic);
    assert!(outcome.reasoning.as_deref().unwrap_or_default().contains("false-negative"));
    assert!(rig.log.position("diff:assert").unwrap() < rig.log.position("judge:extract").unwrap());
}

#[tokio::test]
async fn test_both_oracles_rejecting_fails_after_full_budget() {
    let rig = rig(
        MockPage::new(format!("{}/tasks", BASE)),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(false)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(false)]),
    );

    let result = check(&rig, "A success notification appears", StepRuntime::default()).await;
    let outcome = check_outcome(&result);

    assert!(!outcome.success);
    assert_eq!(rig.log.count("diff:assert"), 3);
    assert_eq!(rig.log.count("judge:extract"), 3);
    // Live page context is attached for diagnostics
    assert!(outcome.actual.contains("[page:"));
    assert!(outcome.actual.contains("/tasks"));
}

// ---- Transition-aware ordering ----

#[tokio::test]
async fn test_transitioned_page_consults_extraction_first() {
    let rig = rig(
        MockPage::new(format!("{}/dashboard", BASE)),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(false)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(true)]),
    );
    let runtime = StepRuntime {
        last_act_url: Some(format!("{}/login", BASE)),
    };

    let result = check(&rig, "The dashboard is shown", runtime).await;

    assert!(result.success());
    assert!(rig.log.position("judge:extract").unwrap() < rig.log.position("diff:assert").unwrap());
}

#[tokio::test]
async fn test_stable_page_consults_diff_first() {
    let url = format!("{}/tasks", BASE);
    let rig = rig(
        MockPage::new(url.clone()),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(true)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(true)]),
    );
    let runtime = StepRuntime { last_act_url: Some(url) };

    let result = check(&rig, "The task is marked done", runtime).await;

    assert!(result.success());
    assert_eq!(rig.log.count("diff:assert"), 1);
    assert_eq!(rig.log.count("judge:extract"), 0);
}

#[tokio::test]
async fn test_navigation_act_then_check_uses_transition() {
    let rig = rig(
        MockPage::new(format!("{}/home", BASE)),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(true)]),
        MockDiffOracle::new(),
    );
    let config = config();
    let executor = StepExecutor::new(&rig.adapters, &config);

    let (act, runtime) = executor
        .run_step(&Step::act("Navigate to /projects", 1), StepRuntime::default())
        .await;
    assert!(act.success());

    let (check, _) = executor
        .run_step(&Step::check("The projects list is shown", 2), runtime)
        .await;
    assert!(check.success());
    assert_eq!(rig.log.count("diff:assert"), 0);
    assert_eq!(rig.log.count("judge:extract"), 1);
}

// ---- Deterministic paths ----

#[tokio::test]
async fn test_quoted_text_present_skips_oracles() {
    let rig = rig(
        MockPage::new(BASE).with_body_text("Welcome back, Ada!"),
        MockAgent::new(),
        MockJudge::new(),
        MockDiffOracle::new(),
    );

    let result = check(&rig, "'Welcome back' appears on the page", StepRuntime::default()).await;
    let outcome = check_outcome(&result);

    assert!(outcome.success);
    assert_eq!(outcome.kind, CheckKind::Deterministic);
    assert_eq!(rig.log.count("diff:assert"), 0);
    assert_eq!(rig.log.count("judge:extract"), 0);
}

#[tokio::test]
async fn test_quoted_text_absent_falls_through_to_judgment() {
    let rig = rig(
        MockPage::new(BASE).with_body_text("Nothing to see"),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(true)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(false)]),
    );

    let result = check(&rig, "'Buy milk' appears on the page", StepRuntime::default()).await;
    let outcome = check_outcome(&result);

    assert!(outcome.success);
    assert_eq!(outcome.kind, CheckKind::Semantic);
    assert_eq!(rig.log.count("diff:assert"), 1);
}

#[tokio::test]
async fn test_negated_quoted_check_is_not_a_literal_pass() {
    let rig = rig(
        MockPage::new(BASE).with_body_text("Groceries: Buy milk"),
        MockAgent::new(),
        MockJudge::new().with_verdicts(vec![Ok(false)]),
        MockDiffOracle::new().with_verdicts(vec![Ok(false)]),
    );

    for instruction in ["The list does not contain 'Buy milk'", "'Buy milk' should not appear"] {
        let result = check(&rig, instruction, StepRuntime::default()).await;
        let outcome = check_outcome(&result);
        assert!(!outcome.success, "{}", instruction);
        assert_eq!(outcome.kind, CheckKind::Semantic);
    }
    assert!(rig.log.count("diff:assert") > 0);
}

#[tokio::test]
async fn test_pattern_check_never_escalates() {
    let rig = rig(MockPage::new(format!("{}/home", BASE)), MockAgent::new(), MockJudge::new(), MockDiffOracle::new());

    let result = check(&rig, "URL contains /tasks", StepRuntime::default()).await;
    let outcome = check_outcome(&result);

    assert!(!outcome.success);
    assert_eq!(outcome.kind, CheckKind::Deterministic);
    assert_eq!(rig.log.count("diff:assert"), 0);
    assert_eq!(rig.log.count("judge:extract"), 0);
}

// ---- Chains ----

fn task_catalog() -> Catalog {
    Catalog::new(vec![
        Behavior::new("Sign Up").with_scenario(Scenario::new(
            "default",
            vec![
                Step::act("Type 'ada@test.com' into the email field", 1),
                Step::act("Type 'secret' into the password field", 2),
                Step::act("Click the sign up button", 3),
                Step::check("URL contains /", 4),
            ],
        )),
        Behavior::new("Add Task")
            .with_dependency(DependencyRef::new("sign-up"))
            .with_page_path("/tasks")
            .with_scenario(Scenario::new(
                "default",
                vec![
                    Step::act("Type 'Buy milk' into the title field", 1),
                    Step::check("URL contains /tasks", 2),
                ],
            )),
    ])
    .unwrap()
}

#[test]
fn test_chain_is_dependency_first() {
    let chain = build_chain("add-task", &task_catalog(), CyclePolicy::Reject).unwrap();
    let ids: Vec<_> = chain.iter().map(|l| l.behavior_id.as_str()).collect();
    assert_eq!(ids, vec!["sign-up", "add-task"]);
}

#[tokio::test]
async fn test_known_dependency_failure_short_circuits() {
    let catalog = task_catalog();
    let executor = MockScenarioExecutor::new();
    let mut context = VerificationContext::new();
    let sign_up = catalog.get("sign-up").unwrap().clone();
    context.record(BehaviorContext::failed(&sign_up, "earlier failure", Duration::from_millis(5)));

    let result = BehaviorRunner::new(config())
        .run("add-task", &catalog, &mut context, &mut tracker(), &executor)
        .await;

    assert_eq!(result.status, BehaviorStatus::DependencyFailed);
    assert_eq!(result.failed_dependency.as_deref(), Some("sign-up"));
    assert_eq!(result.duration_ms, 0);
    assert!(executor.executions().is_empty());
}

#[tokio::test]
async fn test_missing_dependency_fails_before_execution() {
    let catalog = Catalog::new(vec![Behavior::new("Add Task")
        .with_dependency(DependencyRef::new("sign-up"))
        .with_scenario(Scenario::new("default", vec![Step::act("Click 'Add'", 1)]))])
    .unwrap();
    let executor = MockScenarioExecutor::new();
    let mut context = VerificationContext::new();

    let result = BehaviorRunner::new(config())
        .run("add-task", &catalog, &mut context, &mut tracker(), &executor)
        .await;

    assert_eq!(result.status, BehaviorStatus::Fail);
    assert!(result.error.unwrap_or_default().contains("sign-up"));
    assert!(executor.executions().is_empty());
}

#[tokio::test]
async fn test_chain_runs_live_with_session_policies() {
    let log = CallLog::new();
    let page = Arc::new(MockPage::new("about:blank").with_log(log.clone()));
    let agent = Arc::new(MockAgent::new().with_log(log.clone()));
    let adapters = Adapters::new(
        page.clone(),
        agent.clone(),
        Arc::new(MockJudge::new().with_log(log.clone())),
        Arc::new(MockDiffOracle::new().with_log(log.clone())),
    );
    let executor = ScenarioRunner::new(adapters, config());
    let mut context = VerificationContext::new();
    let mut credentials = tracker();

    let result = BehaviorRunner::new(config())
        .run("add-task", &task_catalog(), &mut context, &mut credentials, &executor)
        .await;

    assert!(result.is_pass(), "{:?}", result);
    assert_eq!(log.count("page:evaluate clear-storage"), 1);
    assert_eq!(log.count("page:soft-navigate /tasks"), 1);
    assert!(agent.acts().contains(&"Type 'ada_1@test.com' into the email field".to_string()));
    assert_eq!(credentials.credentials().password.as_deref(), Some("secret"));
    assert_eq!(page.url(), "http://localhost:3000/tasks");
}
