//! Behavior catalog: the full set of behaviors for one verification run
//!
//! Catalogs are loaded from a JSON document:
//!
//! ```json
//! {
//!   "behaviors": [
//!     {
//!       "title": "Add Task",
//!       "dependencies": ["1. Sign Up"],
//!       "page": "/tasks",
//!       "scenarios": [
//!         { "name": "Default", "steps": ["* Act: Click 'New task'", "* Check: 'Task added' appears"] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::types::{slugify, Behavior, DependencyRef, Scenario, Step};
use crate::{AttestError, Result};

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    behaviors: Vec<BehaviorSpec>,
}

#[derive(Debug, Deserialize)]
struct BehaviorSpec {
    title: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Deserialize)]
struct ScenarioSpec {
    name: String,
    steps: Vec<String>,
}

/// Immutable set of behaviors indexed by identity
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    behaviors: Vec<Behavior>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate identities
    ///
    /// Dependency references are not checked here; see [`Catalog::validate`].
    pub fn new(behaviors: Vec<Behavior>) -> Result<Self> {
        let mut index = HashMap::with_capacity(behaviors.len());
        for (position, behavior) in behaviors.iter().enumerate() {
            if index.insert(behavior.id.clone(), position).is_some() {
                return Err(AttestError::Catalog(format!(
                    "Duplicate behavior identity: {}",
                    behavior.id
                )));
            }
        }
        Ok(Self { behaviors, index })
    }

    /// Parse and validate a JSON catalog document
    pub fn from_json(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        let mut line = 0u32;
        let mut behaviors = Vec::with_capacity(document.behaviors.len());

        for spec in document.behaviors {
            let mut behavior = Behavior::new(&spec.title).with_description(spec.description);
            if let Some(id) = spec.id {
                behavior.id = slugify(&id);
            }
            if let Some(page) = spec.page {
                behavior = behavior.with_page_path(page);
            }
            for dependency in &spec.dependencies {
                behavior = behavior.with_dependency(DependencyRef::parse(dependency)?);
            }
            for scenario in spec.scenarios {
                let mut steps = Vec::with_capacity(scenario.steps.len());
                for text in &scenario.steps {
                    line += 1;
                    steps.push(Step::parse_line(text, line)?);
                }
                behavior = behavior.with_scenario(Scenario::new(scenario.name, steps));
            }
            if behavior.scenarios.is_empty() {
                return Err(AttestError::Catalog(format!(
                    "Behavior '{}' has no scenarios",
                    behavior.id
                )));
            }
            behaviors.push(behavior);
        }

        let catalog = Self::new(behaviors)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a JSON catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check that every dependency reference resolves
    pub fn validate(&self) -> Result<()> {
        for behavior in &self.behaviors {
            for dependency in &behavior.dependencies {
                let target = self.get(&dependency.behavior).ok_or_else(|| {
                    AttestError::Catalog(format!(
                        "Behavior '{}' depends on unknown behavior '{}'",
                        behavior.id, dependency.behavior
                    ))
                })?;
                if let Some(scenario) = &dependency.scenario {
                    if target.scenario(Some(scenario)).is_none() {
                        return Err(AttestError::Catalog(format!(
                            "Behavior '{}' references unknown scenario '{}'",
                            behavior.id, dependency
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Behavior> {
        self.index.get(id).map(|&position| &self.behaviors[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Behavior> {
        self.behaviors.iter()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckKind;

    const SAMPLE: &str = r#"{
        "behaviors": [
            {
                "title": "Sign Up",
                "page": "/signup",
                "scenarios": [
                    { "name": "Default", "steps": [
                        "* Act: Type 'user@test.com' into the email field",
                        "* Act: Type 'secret123' into the password field",
                        "* Act: Click 'Create account'",
                        "* Check: URL contains /dashboard"
                    ]}
                ]
            },
            {
                "title": "Add Task",
                "dependencies": ["1. Sign Up: Default"],
                "page": "/tasks",
                "scenarios": [
                    { "name": "Default", "steps": [
                        "* Act: Click 'New task'",
                        "* Check: 'Task added' appears"
                    ]}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let add_task = catalog.get("add-task").unwrap();
        assert_eq!(add_task.dependencies, vec![DependencyRef::new("sign-up").with_scenario("default")]);
        assert_eq!(add_task.page_path.as_deref(), Some("/tasks"));

        let sign_up = catalog.get("sign-up").unwrap();
        let steps = &sign_up.scenario(None).unwrap().steps;
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].line(), 1);
        match &steps[3] {
            Step::Check { kind, .. } => assert_eq!(*kind, CheckKind::Deterministic),
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_missing_dependency_is_load_error() {
        let json = r#"{"behaviors": [
            {"title": "Add Task", "dependencies": ["Sign Up"],
             "scenarios": [{"name": "Default", "steps": ["Act: Click 'New'"]}]}
        ]}"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(matches!(err, AttestError::Catalog(msg) if msg.contains("sign-up")));
    }

    #[test]
    fn test_missing_scenario_is_load_error() {
        let json = r#"{"behaviors": [
            {"title": "Sign Up", "scenarios": [{"name": "Default", "steps": ["Act: Click 'Go'"]}]},
            {"title": "Add Task", "dependencies": ["Sign Up: With Google"],
             "scenarios": [{"name": "Default", "steps": ["Act: Click 'New'"]}]}
        ]}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let result = Catalog::new(vec![Behavior::new("Sign Up"), Behavior::new("sign up")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_id_is_slugified() {
        let json = r#"{"behaviors": [
            {"title": "Register", "id": "Sign Up", "scenarios": [{"name": "Default", "steps": ["Act: Click 'Go'"]}]}
        ]}"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert!(catalog.get("sign-up").is_some());
    }
}
