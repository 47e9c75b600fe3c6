//! Suite runner
//!
//! Verifies a list of behaviors one after another. All behaviors share a
//! single [`VerificationContext`] and [`CredentialTracker`], so a failure
//! recorded early short-circuits dependents later in the run.

use std::sync::Arc;

use attest_core::{AttestConfig, BehaviorContext, BehaviorStatus, Catalog, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::VerificationContext;
use crate::credentials::CredentialTracker;
use crate::runner::{unresolved, BehaviorRunner, ScenarioExecutor};

/// Outcome of one suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub base_url: String,
    /// Requested behaviors, in request order
    pub results: Vec<BehaviorContext>,
    pub passed: usize,
    pub failed: usize,
    pub dependency_failed: usize,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.dependency_failed == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs behaviors through a [`BehaviorRunner`] with per-behavior timeouts
pub struct SuiteRunner {
    config: AttestConfig,
    executor: Arc<dyn ScenarioExecutor>,
}

impl SuiteRunner {
    pub fn new(config: AttestConfig, executor: Arc<dyn ScenarioExecutor>) -> Self {
        Self { config, executor }
    }

    /// Verify every behavior in catalog order
    pub async fn verify_all(&self, catalog: &Catalog) -> RunReport {
        let ids: Vec<String> = catalog.iter().map(|b| b.id.clone()).collect();
        self.verify(catalog, &ids).await
    }

    /// Verify the given behavior ids, in order
    pub async fn verify(&self, catalog: &Catalog, ids: &[String]) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Run {}: verifying {} behavior(s) against {}", run_id, ids.len(), self.config.base_url);

        let runner = BehaviorRunner::new(self.config.clone());
        let mut context = VerificationContext::new();
        let mut credentials = CredentialTracker::new();
        let limit = self.config.timing.behavior_timeout();
        let mut results: Vec<BehaviorContext> = Vec::new();

        for id in ids {
            if results.iter().any(|r| &r.behavior_id == id) {
                continue;
            }
            if let Some(recorded) = context.get(id) {
                debug!("{}: reusing result recorded earlier in this run", id);
                results.push(recorded.clone());
                continue;
            }

            let run = runner.run(id, catalog, &mut context, &mut credentials, self.executor.as_ref());
            let result = match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{}: timed out after {:?}", id, limit);
                    let error = format!("Timed out after {}s", limit.as_secs());
                    let result = match catalog.get(id) {
                        Some(behavior) => BehaviorContext::failed(behavior, error, limit),
                        None => unresolved(id, error),
                    };
                    context.record(result.clone());
                    result
                }
            };
            results.push(result);
        }

        let count = |status: BehaviorStatus| results.iter().filter(|r| r.status == status).count();
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            base_url: self.config.base_url.clone(),
            passed: count(BehaviorStatus::Pass),
            failed: count(BehaviorStatus::Fail),
            dependency_failed: count(BehaviorStatus::DependencyFailed),
            results,
        };
        info!(
            "Run {}: {} passed, {} failed, {} dependency-failed",
            run_id, report.passed, report.failed, report.dependency_failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ExecutionOptions, ScenarioOutcome};
    use crate::testing::MockScenarioExecutor;
    use async_trait::async_trait;
    use attest_core::{Behavior, DependencyRef, Scenario, Step};

    fn catalog() -> Catalog {
        let scenario = || Scenario::new("default", vec![Step::act("Click 'Go'", 1)]);
        Catalog::new(vec![
            Behavior::new("Sign Up").with_scenario(scenario()),
            Behavior::new("Add Task")
                .with_dependency(DependencyRef::new("sign-up"))
                .with_scenario(scenario()),
            Behavior::new("Browse Help").with_scenario(scenario()),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_all_counts() {
        let executor = Arc::new(MockScenarioExecutor::new().with_failure("sign-up", "boom"));
        let suite = SuiteRunner::new(AttestConfig::default(), executor.clone());
        let report = suite.verify_all(&catalog()).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dependency_failed, 1);
        assert_eq!(report.passed, 1);
        assert!(!report.all_passed());
        // add-task never ran: sign-up had already failed
        assert_eq!(executor.executed_ids(), vec!["sign-up", "browse-help"]);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"dependency_failed\""));
    }

    #[tokio::test]
    async fn test_recorded_dependency_is_reused() {
        let executor = Arc::new(MockScenarioExecutor::new().with_failure("sign-up", "boom"));
        let suite = SuiteRunner::new(AttestConfig::default(), executor.clone());
        let ids = vec!["add-task".to_string(), "sign-up".to_string()];
        let report = suite.verify(&catalog(), &ids).await;

        assert_eq!(report.results[0].status, BehaviorStatus::DependencyFailed);
        assert_eq!(report.results[1].status, BehaviorStatus::Fail);
        assert_eq!(executor.executed_ids(), vec!["sign-up"]);
    }

    struct Stalling;

    #[async_trait]
    impl ScenarioExecutor for Stalling {
        async fn execute(&self, _: &Behavior, _: &Scenario, _: ExecutionOptions) -> Result<ScenarioOutcome> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_behavior_timeout_is_a_failure() {
        let mut config = AttestConfig::default();
        config.timing.behavior_timeout_secs = 1;
        let suite = SuiteRunner::new(config, Arc::new(Stalling));
        let report = suite.verify(&catalog(), &["browse-help".to_string()]).await;

        assert_eq!(report.failed, 1);
        assert!(report.results[0].error.as_deref().unwrap_or_default().contains("Timed out"));
    }
}
