//! Dependency chain construction
//!
//! Iterative depth-first traversal with an explicit stack. A behavior is
//! appended only after all of its dependencies, and a behavior reachable by
//! several paths is visited once. Back-edges are cycles, handled per
//! [`CyclePolicy`].

use attest_core::{AttestError, Catalog, CyclePolicy, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One behavior in an ordered chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub behavior_id: String,
    /// Scenario named by the dependency reference that first reached it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

enum Frame {
    Enter {
        id: String,
        scenario: Option<String>,
    },
    Exit {
        id: String,
        scenario: Option<String>,
    },
}

/// Order the behaviors needed to run `target`: dependencies first, target last
///
/// Fails when the target or any transitive dependency is missing, and on
/// cycles under [`CyclePolicy::Reject`].
pub fn build_chain(target: &str, catalog: &Catalog, policy: CyclePolicy) -> Result<Vec<ChainLink>> {
    let mut chain = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut stack = vec![Frame::Enter {
        id: target.to_string(),
        scenario: None,
    }];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter { id, scenario } => {
                if visited.contains(&id) {
                    continue;
                }

                if path.contains(&id) {
                    let cycle = format!("{} -> {}", path.join(" -> "), id);
                    match policy {
                        CyclePolicy::Reject => return Err(AttestError::DependencyCycle(cycle)),
                        CyclePolicy::Tolerate => {
                            warn!("Skipping dependency back-edge: {}", cycle);
                            continue;
                        }
                    }
                }

                let behavior = catalog
                    .get(&id)
                    .ok_or_else(|| AttestError::BehaviorNotFound(id.clone()))?;

                path.push(id.clone());
                stack.push(Frame::Exit {
                    id,
                    scenario,
                });
                for dependency in behavior.dependencies.iter().rev() {
                    stack.push(Frame::Enter {
                        id: dependency.behavior.clone(),
                        scenario: dependency.scenario.clone(),
                    });
                }
            }
            Frame::Exit { id, scenario } => {
                path.pop();
                visited.insert(id.clone());
                chain.push(ChainLink {
                    behavior_id: id,
                    scenario,
                });
            }
        }
    }

    debug!(
        "Chain for {}: {}",
        target,
        chain
            .iter()
            .map(|link| link.behavior_id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{Behavior, DependencyRef, Scenario, Step};

    fn behavior(title: &str, deps: &[&str]) -> Behavior {
        deps.iter().fold(
            Behavior::new(title).with_scenario(Scenario::new("default", vec![Step::act("Click 'Go'", 1)])),
            |b, dep| b.with_dependency(DependencyRef::new(*dep)),
        )
    }

    fn ids(chain: &[ChainLink]) -> Vec<&str> {
        chain.iter().map(|l| l.behavior_id.as_str()).collect()
    }

    #[test]
    fn test_simple_chain() {
        let catalog = Catalog::new(vec![behavior("Sign Up", &[]), behavior("Add Task", &["sign-up"])]).unwrap();
        let chain = build_chain("add-task", &catalog, CyclePolicy::Reject).unwrap();
        assert_eq!(ids(&chain), vec!["sign-up", "add-task"]);
    }

    #[test]
    fn test_diamond_visits_once() {
        let catalog = Catalog::new(vec![
            behavior("Sign Up", &[]),
            behavior("Create Project", &["sign-up"]),
            behavior("Invite Member", &["sign-up"]),
            behavior("Assign Task", &["create-project", "invite-member"]),
        ])
        .unwrap();

        let chain = build_chain("assign-task", &catalog, CyclePolicy::Reject).unwrap();
        assert_eq!(
            ids(&chain),
            vec!["sign-up", "create-project", "invite-member", "assign-task"]
        );
    }

    #[test]
    fn test_scenario_from_reference() {
        let catalog = Catalog::new(vec![
            behavior("Sign Up", &[]),
            Behavior::new("Edit Profile")
                .with_dependency(DependencyRef::new("sign-up").with_scenario("with-email"))
                .with_scenario(Scenario::new("default", vec![])),
        ])
        .unwrap();

        let chain = build_chain("edit-profile", &catalog, CyclePolicy::Reject).unwrap();
        assert_eq!(chain[0].scenario.as_deref(), Some("with-email"));
        assert!(chain[1].scenario.is_none());
    }

    #[test]
    fn test_missing_dependency_fails() {
        let catalog = Catalog::new(vec![behavior("Add Task", &["sign-up"])]).unwrap();
        let err = build_chain("add-task", &catalog, CyclePolicy::Reject).unwrap_err();
        assert!(matches!(err, AttestError::BehaviorNotFound(id) if id == "sign-up"));

        assert!(build_chain("nope", &catalog, CyclePolicy::Tolerate).is_err());
    }

    #[test]
    fn test_cycle_policy() {
        let catalog = Catalog::new(vec![behavior("A", &["b"]), behavior("B", &["a"])]).unwrap();

        let err = build_chain("a", &catalog, CyclePolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("a -> b -> a"));

        let chain = build_chain("a", &catalog, CyclePolicy::Tolerate).unwrap();
        assert_eq!(ids(&chain), vec!["b", "a"]);
    }

    #[test]
    fn test_deep_chain_is_iterative() {
        let mut behaviors = vec![behavior("Step 0", &[])];
        for i in 1..5_000 {
            let previous = format!("step-{}", i - 1);
            behaviors.push(behavior(&format!("Step {}", i), &[previous.as_str()]));
        }
        let catalog = Catalog::new(behaviors).unwrap();

        let chain = build_chain("step-4999", &catalog, CyclePolicy::Reject).unwrap();
        assert_eq!(chain.len(), 5_000);
        assert_eq!(chain[0].behavior_id, "step-0");
    }
}
