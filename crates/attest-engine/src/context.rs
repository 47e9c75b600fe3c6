//! Results recorded during a verification run

use attest_core::{Behavior, BehaviorContext, BehaviorStatus};
use serde::Serialize;
use std::collections::HashMap;

/// Per-run record of behavior outcomes, keyed by behavior id
///
/// The first recorded result for an id wins; iteration follows insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct VerificationContext {
    order: Vec<String>,
    results: HashMap<String, BehaviorContext>,
}

/// Outcome counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub dependency_failed: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.dependency_failed
    }
}

impl VerificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result; returns false if the id already had one
    pub fn record(&mut self, result: BehaviorContext) -> bool {
        if self.results.contains_key(&result.behavior_id) {
            return false;
        }
        self.order.push(result.behavior_id.clone());
        self.results.insert(result.behavior_id.clone(), result);
        true
    }

    pub fn get(&self, behavior_id: &str) -> Option<&BehaviorContext> {
        self.results.get(behavior_id)
    }

    pub fn contains(&self, behavior_id: &str) -> bool {
        self.results.contains_key(behavior_id)
    }

    /// First direct dependency already recorded as anything but a pass
    pub fn failed_dependency<'a>(&'a self, behavior: &Behavior) -> Option<&'a BehaviorContext> {
        behavior
            .dependencies
            .iter()
            .filter_map(|dep| self.results.get(&dep.behavior))
            .find(|result| !result.is_pass())
    }

    /// Recorded results in insertion order
    pub fn results(&self) -> impl Iterator<Item = &BehaviorContext> {
        self.order.iter().filter_map(|id| self.results.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn summary(&self) -> Summary {
        self.results().fold(Summary::default(), |mut summary, result| {
            match result.status {
                BehaviorStatus::Pass => summary.passed += 1,
                BehaviorStatus::Fail => summary.failed += 1,
                BehaviorStatus::DependencyFailed => summary.dependency_failed += 1,
            }
            summary
        })
    }
}
