//! Mock implementations of the consumed capabilities
//!
//! Every mock is configured with builder-style `with_*` methods and records
//! its calls. Mocks can share one [`CallLog`] so tests can assert the order in
//! which the engine consulted them.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::agent::{ActOutcome, ActionAgent, Judge, Judgment, ObservedElement};
use crate::error::{AttestError, Result};
use crate::oracle::DiffOracle;
use crate::page::{script_tag, url_origin, PageControl};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared, ordered record of mock invocations
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Number of entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.0).iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e.starts_with(prefix))
    }
}

/// Queue of canned responses; the last one repeats once the rest are used
#[derive(Debug, Clone)]
struct Responses<T: Clone> {
    items: Vec<T>,
    next: usize,
}

impl<T: Clone> Responses<T> {
    fn new(items: Vec<T>) -> Self {
        Self { items, next: 0 }
    }

    fn next(&mut self) -> Option<T> {
        let last = self.items.len().checked_sub(1)?;
        let item = self.items[self.next.min(last)].clone();
        self.next += 1;
        Some(item)
    }
}

struct PageState {
    url: String,
    title: String,
    scripts: HashMap<String, Responses<Value>>,
    failing_clicks: HashSet<String>,
}

/// In-memory [`PageControl`]
///
/// Tagged scripts are answered from the responses configured for their tag;
/// unknown tags evaluate to `null`. Navigation updates the current URL.
pub struct MockPage {
    state: Mutex<PageState>,
    log: CallLog,
}

impl MockPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.into(),
                title: String::new(),
                scripts: HashMap::new(),
                failing_clicks: HashSet::new(),
            }),
            log: CallLog::new(),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        lock(&self.state).title = title.into();
        self
    }

    /// Answer every script tagged `tag` with `value`
    pub fn with_script(self, tag: &str, value: Value) -> Self {
        self.with_script_sequence(tag, vec![value])
    }

    /// Answer successive scripts tagged `tag` with `values`, repeating the last
    pub fn with_script_sequence(self, tag: &str, values: Vec<Value>) -> Self {
        lock(&self.state)
            .scripts
            .insert(tag.to_string(), Responses::new(values));
        self
    }

    /// Rendered body text read by text-presence checks
    pub fn with_body_text(self, text: &str) -> Self {
        self.with_script("body-text", json!(text))
    }

    /// Make clicks on `selector` fail with element-not-found
    pub fn with_failing_click(self, selector: &str) -> Self {
        lock(&self.state).failing_clicks.insert(selector.to_string());
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock(&self.state).url = url.into();
    }

    pub fn url(&self) -> String {
        lock(&self.state).url.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.entries()
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl PageControl for MockPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log.record(format!("page:navigate {}", url));
        self.set_url(url);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.log.record("page:reload");
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        self.log.record("page:idle");
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let tag = script_tag(script).unwrap_or("raw").to_string();
        self.log.record(format!("page:evaluate {}", tag));
        let mut state = lock(&self.state);
        Ok(state
            .scripts
            .get_mut(&tag)
            .and_then(|responses| responses.next())
            .unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String> {
        Ok(lock(&self.state).title.clone())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.log.record(format!("page:press {}", key));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.log.record(format!("page:click {}", selector));
        if lock(&self.state).failing_clicks.contains(selector) {
            return Err(AttestError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn navigate_in_page(&self, path: &str) -> Result<()> {
        self.log.record(format!("page:soft-navigate {}", path));
        let mut state = lock(&self.state);
        let origin = url_origin(&state.url).unwrap_or_default();
        state.url = format!("{}{}", origin, path);
        Ok(())
    }
}

/// Scripted [`ActionAgent`]
///
/// Instructions containing a configured pattern (case-insensitive) take the
/// next scripted result for it; everything else succeeds.
pub struct MockAgent {
    act_scripts: Mutex<Vec<(String, Responses<std::result::Result<(), String>>)>>,
    observed: Mutex<Responses<Vec<ObservedElement>>>,
    log: CallLog,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            act_scripts: Mutex::new(Vec::new()),
            observed: Mutex::new(Responses::new(Vec::new())),
            log: CallLog::new(),
        }
    }

    pub fn with_act_results(self, pattern: &str, results: Vec<std::result::Result<(), String>>) -> Self {
        lock(&self.act_scripts).push((pattern.to_lowercase(), Responses::new(results)));
        self
    }

    /// Elements returned by every `observe` call
    pub fn with_observed(self, elements: Vec<ObservedElement>) -> Self {
        *lock(&self.observed) = Responses::new(vec![elements]);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Instructions passed to `act`, in order
    pub fn acts(&self) -> Vec<String> {
        self.log
            .entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("agent:act ").map(str::to_string))
            .collect()
    }

    pub fn observe_count(&self) -> usize {
        self.log.count("agent:observe")
    }
}

#[async_trait]
impl ActionAgent for MockAgent {
    async fn act(&self, instruction: &str) -> Result<ActOutcome> {
        self.log.record(format!("agent:act {}", instruction));
        let lower = instruction.to_lowercase();
        let scripted = lock(&self.act_scripts)
            .iter_mut()
            .find(|(pattern, _)| lower.contains(pattern.as_str()))
            .and_then(|(_, results)| results.next());

        match scripted {
            Some(Err(message)) => Err(AttestError::Agent(message)),
            _ => Ok(ActOutcome::ok()),
        }
    }

    async fn observe(&self, instruction: Option<&str>) -> Result<Vec<ObservedElement>> {
        self.log
            .record(format!("agent:observe {}", instruction.unwrap_or_default()));
        Ok(lock(&self.observed).next().unwrap_or_default())
    }
}

/// Scripted [`Judge`] answering yes/no judgments
///
/// Verdicts are consumed in order; with none configured every judgment fails.
pub struct MockJudge {
    verdicts: Mutex<Responses<std::result::Result<bool, String>>>,
    prompts: Mutex<Vec<String>>,
    log: CallLog,
}

impl Default for MockJudge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJudge {
    pub fn new() -> Self {
        Self {
            verdicts: Mutex::new(Responses::new(Vec::new())),
            prompts: Mutex::new(Vec::new()),
            log: CallLog::new(),
        }
    }

    pub fn with_verdicts(self, verdicts: Vec<std::result::Result<bool, String>>) -> Self {
        *lock(&self.verdicts) = Responses::new(verdicts);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Judge for MockJudge {
    async fn extract(&self, instruction: &str, _schema: &Value) -> Result<Value> {
        self.log.record("judge:extract");
        lock(&self.prompts).push(instruction.to_string());
        match lock(&self.verdicts).next().unwrap_or(Ok(false)) {
            Ok(passed) => Ok(serde_json::to_value(Judgment::new(passed, "mock verdict"))?),
            Err(message) => Err(AttestError::Judgment(message)),
        }
    }
}

/// Scripted [`DiffOracle`]
///
/// `assert` and `wait_for` consume their own verdict queues; both default to
/// failing.
pub struct MockDiffOracle {
    asserts: Mutex<Responses<std::result::Result<bool, String>>>,
    waits: Mutex<Responses<bool>>,
    log: CallLog,
}

impl Default for MockDiffOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDiffOracle {
    pub fn new() -> Self {
        Self {
            asserts: Mutex::new(Responses::new(Vec::new())),
            waits: Mutex::new(Responses::new(Vec::new())),
            log: CallLog::new(),
        }
    }

    pub fn with_verdicts(self, verdicts: Vec<std::result::Result<bool, String>>) -> Self {
        *lock(&self.asserts) = Responses::new(verdicts);
        self
    }

    pub fn with_wait_results(self, results: Vec<bool>) -> Self {
        *lock(&self.waits) = Responses::new(results);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl DiffOracle for MockDiffOracle {
    async fn snapshot(&self, _page: &dyn PageControl) -> Result<()> {
        self.log.record("diff:snapshot");
        Ok(())
    }

    fn clear_snapshots(&self) {
        self.log.record("diff:clear");
    }

    async fn assert(&self, _page: &dyn PageControl, instruction: &str) -> Result<Judgment> {
        self.log.record(format!("diff:assert {}", instruction));
        match lock(&self.asserts).next().unwrap_or(Ok(false)) {
            Ok(passed) => Ok(Judgment::new(passed, "mock diff verdict")),
            Err(message) => Err(AttestError::Judgment(message)),
        }
    }

    async fn wait_for(&self, _page: &dyn PageControl, instruction: &str, _timeout: Duration) -> Result<bool> {
        self.log.record(format!("diff:wait_for {}", instruction));
        Ok(lock(&self.waits).next().unwrap_or(false))
    }
}
