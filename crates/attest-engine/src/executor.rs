//! Step execution
//!
//! Runs one Act or Check step against the page. Acts are dispatched by
//! intent: direct navigation and refresh bypass the agent, selections walk a
//! native / custom / DOM-scan ladder, and everything else goes through the
//! agent with bounded retry and a fallback chain. Checks try a deterministic
//! inspection, then a literal text match, then the dual-oracle judgment.

use std::sync::Arc;
use std::time::Instant;

use attest_browser::diagnostics::{
    interactive_elements, is_unexpected_page, page_context_summary, page_outline, CONTEXT_ELEMENT_LIMIT,
};
use attest_browser::dom_fallback::{click_by_text, element_tag, select_by_scan, select_native};
use attest_browser::modal::{auto_confirm, dismiss_leftover, wait_for_dismissal, wait_for_modal};
use attest_browser::page::{resolve_url, url_path};
use attest_browser::{inspect, judge_yes_no, text_presence, ActionAgent, DiffOracle, Judge, Judgment, PageControl};
use attest_core::fail_open::{fail_open, fail_open_or};
use attest_core::{
    parse_deterministic, quoted_text_expectation, slugify, ActResult, AttestConfig, AttestError, CheckKind,
    CheckResult, Result, Step, StepResult,
};
use tracing::{debug, info, warn};

use crate::check::{advance, extraction_prompt, pass_reasoning, plan_for, CheckState, OracleKind, PageTransition};
use crate::intent::{click_target, detect_intent, intent_name, option_choice, Intent};
use crate::retry::{categorize_error, ErrorCategory, RetryPolicy, TransientKind};

const MODAL_VISIBLE: &str = "A modal or dialog is visible";
const SNAPSHOT_OUTLINE_LIMIT: usize = 2_000;

/// The capabilities a step runs against
#[derive(Clone)]
pub struct Adapters {
    pub page: Arc<dyn PageControl>,
    pub agent: Arc<dyn ActionAgent>,
    pub judge: Arc<dyn Judge>,
    pub oracle: Arc<dyn DiffOracle>,
}

impl Adapters {
    pub fn new(
        page: Arc<dyn PageControl>,
        agent: Arc<dyn ActionAgent>,
        judge: Arc<dyn Judge>,
        oracle: Arc<dyn DiffOracle>,
    ) -> Self {
        Self {
            page,
            agent,
            judge,
            oracle,
        }
    }
}

/// Facts carried from one step to the next within a scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepRuntime {
    /// URL observed just before the most recent Act
    pub last_act_url: Option<String>,
}

impl StepRuntime {
    fn after_act(&self, pre_action_url: String) -> Self {
        Self {
            last_act_url: Some(pre_action_url),
        }
    }
}

/// Executes single steps
pub struct StepExecutor<'a> {
    adapters: &'a Adapters,
    config: &'a AttestConfig,
    retry: RetryPolicy,
}

impl<'a> StepExecutor<'a> {
    pub fn new(adapters: &'a Adapters, config: &'a AttestConfig) -> Self {
        Self {
            adapters,
            config,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    fn page(&self) -> &dyn PageControl {
        self.adapters.page.as_ref()
    }

    async fn current_url(&self) -> String {
        fail_open_or("read_url", String::new(), || self.page().current_url()).await
    }

    pub async fn run_step(&self, step: &Step, runtime: StepRuntime) -> (StepResult, StepRuntime) {
        info!("Line {}: {}", step.line(), step);
        match step {
            Step::Act { instruction, .. } => {
                let (result, runtime) = self.run_act(instruction, &runtime).await;
                (StepResult::act(step.clone(), result), runtime)
            }
            Step::Check { instruction, .. } => {
                let result = self.run_check(instruction, &runtime).await;
                (StepResult::check(step.clone(), result), runtime)
            }
        }
    }

    // ---- Act ----

    async fn run_act(&self, instruction: &str, runtime: &StepRuntime) -> (ActResult, StepRuntime) {
        let started = Instant::now();
        let pre_url = self.current_url().await;
        self.rebaseline().await;

        let intent = detect_intent(instruction);
        debug!("Intent {} for {:?}", intent_name(instruction), instruction);

        let outcome = match &intent {
            Intent::Navigate { target } => self.navigate_direct(target).await,
            Intent::Refresh => self.refresh_direct().await,
            Intent::Select { field, value } => self.select_option(field, value).await,
            Intent::ModalConfirm => self.confirm_modal(instruction).await,
            _ => self.act_with_fallbacks(instruction).await,
        };

        let result = match outcome {
            Ok(()) => {
                self.stabilize(&intent, &pre_url).await;
                ActResult::succeeded(started.elapsed(), self.current_url().await)
            }
            Err(e) => {
                let url = self.current_url().await;
                if already_at_target(&intent, &url) {
                    info!("Act failed but {} already shows the target; treating as done", url);
                    ActResult::succeeded(started.elapsed(), url)
                } else {
                    self.failed_act(started, e).await
                }
            }
        };

        (result, runtime.after_act(pre_url))
    }

    /// Fresh diff baseline for the next Check
    async fn rebaseline(&self) {
        let oracle = self.adapters.oracle.as_ref();
        oracle.clear_snapshots();
        fail_open("diff_snapshot", || oracle.snapshot(self.page())).await;
    }

    async fn navigate_direct(&self, target: &str) -> Result<()> {
        let url = resolve_url(&self.config.base_url, target);
        info!("Navigating directly to {}", url);
        self.page().navigate(&url).await?;
        self.page()
            .wait_for_network_idle(self.config.timing.network_idle_timeout())
            .await
    }

    async fn refresh_direct(&self) -> Result<()> {
        info!("Reloading page");
        self.page().reload().await?;
        self.page()
            .wait_for_network_idle(self.config.timing.network_idle_timeout())
            .await
    }

    /// One agent action, with a reported failure turned into an error
    async fn act_once(&self, instruction: &str) -> Result<()> {
        let outcome = self.adapters.agent.act(instruction).await?;
        if outcome.success {
            Ok(())
        } else if outcome.message.is_empty() {
            Err(AttestError::Agent(format!("Agent could not perform: {}", instruction)))
        } else {
            Err(AttestError::Agent(outcome.message))
        }
    }

    async fn act_with_retry(&self, instruction: &str) -> Result<()> {
        self.retry.run("act", || self.act_once(instruction)).await
    }

    /// Native select, then the agent's open-and-choose, then a DOM scan
    async fn select_option(&self, field: &str, value: &str) -> Result<()> {
        let page = self.page();
        let agent = self.adapters.agent.as_ref();
        let query = format!("the {} dropdown or select control", field);
        let observed = fail_open_or("observe_select", Vec::new(), || agent.observe(Some(query.as_str()))).await;

        if let Some(element) = observed.first() {
            let by_method = element
                .method
                .as_deref()
                .map(|m| m.eq_ignore_ascii_case("selectOption"))
                .unwrap_or(false);
            let native = by_method
                || fail_open("element_tag", || element_tag(page, &element.selector))
                    .await
                    .flatten()
                    .as_deref()
                    == Some("select");

            if native {
                if fail_open_or("select_native", false, || select_native(page, &element.selector, value)).await {
                    info!("Selected {:?} in native select {}", value, element.selector);
                    return Ok(());
                }
                debug!("Native select {} did not take {:?}", element.selector, value);
            } else {
                let open = format!("Click the {} dropdown to open it", field);
                let choose = format!("Click the '{}' option", value);
                match self.act_with_retry(&open).await {
                    Ok(()) => match self.act_with_retry(&choose).await {
                        Ok(()) => return Ok(()),
                        Err(e) => debug!("Choosing {:?} failed: {}", value, e),
                    },
                    Err(e) => debug!("Opening {} failed: {}", field, e),
                }
            }
        }

        if fail_open_or("select_scan", false, || select_by_scan(page, field, value)).await {
            info!("Selected {:?} by scanning visible selects", value);
            return Ok(());
        }
        Err(AttestError::ElementNotFound(format!(
            "no option {:?} in the {} control",
            value, field
        )))
    }

    async fn confirm_modal(&self, instruction: &str) -> Result<()> {
        let timing = &self.config.timing;
        let confirmed = fail_open_or("auto_confirm", false, || {
            auto_confirm(
                self.page(),
                self.adapters.agent.as_ref(),
                timing.modal_poll(),
                timing.modal_timeout(),
            )
        })
        .await;
        if confirmed {
            return Ok(());
        }
        self.act_with_fallbacks(instruction).await
    }

    /// Agent with retry, then overlay dismissal, then a DOM select scan and a click by text
    async fn act_with_fallbacks(&self, instruction: &str) -> Result<()> {
        let error = match self.act_with_retry(instruction).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let url = self.current_url().await;
        if is_unexpected_page(&url) {
            warn!("Act failed on unexpected page {}: {}", url, error);
            return Err(AttestError::UnexpectedPage(format!(
                "{} looks like a sign-in or error page: {}",
                url, error
            )));
        }

        self.dismiss_overlays().await;
        match self.act_once(instruction).await {
            Ok(()) => {
                info!("Act succeeded after overlay dismissal");
                return Ok(());
            }
            Err(e) => debug!("Act still failing after overlay dismissal: {}", e),
        }

        let page = self.page();
        if let Some((field, value)) = option_choice(instruction) {
            if fail_open_or("select_scan", false, || select_by_scan(page, &field, &value)).await {
                info!("Selected {:?} by scanning visible selects", value);
                return Ok(());
            }
        }

        if let Some(target) = click_target(instruction) {
            if let Some(matched) = fail_open("click_by_text", || click_by_text(page, &target)).await.flatten() {
                info!("Clicked {:?} through DOM fallback ({:?})", target, matched);
                return Ok(());
            }
        }

        Err(self.enrich(error).await)
    }

    async fn dismiss_overlays(&self) {
        let page = self.page();
        let timing = &self.config.timing;
        fail_open("press_escape", || page.press_key("Escape")).await;
        fail_open("dismiss_leftover", || {
            dismiss_leftover(page, timing.modal_poll(), timing.modal_timeout())
        })
        .await;
    }

    /// Attach live page context to malformed-output errors
    async fn enrich(&self, error: AttestError) -> AttestError {
        match categorize_error(&error) {
            ErrorCategory::Transient(TransientKind::MalformedOutput) => {
                let context = page_context_summary(self.page(), CONTEXT_ELEMENT_LIMIT).await;
                AttestError::Agent(format!("{} {}", error, context))
            }
            _ => error,
        }
    }

    async fn stabilize(&self, intent: &Intent, pre_url: &str) {
        let page = self.page();
        let timing = &self.config.timing;
        match intent {
            Intent::Save => {
                let closed = fail_open_or("form_dismissal", false, || {
                    wait_for_dismissal(page, timing.modal_poll(), timing.form_dismiss_timeout())
                })
                .await;
                debug!("Form dialog closed after save: {}", closed);
                fail_open("network_idle", || page.wait_for_network_idle(timing.network_idle_timeout())).await;
            }
            Intent::ModalConfirm => {
                fail_open("network_idle", || page.wait_for_network_idle(timing.network_idle_timeout())).await;
            }
            Intent::ModalTrigger => {
                let found = fail_open("wait_for_modal", || {
                    wait_for_modal(page, timing.modal_poll(), timing.modal_timeout())
                })
                .await
                .flatten();
                if found.is_none() {
                    let oracle = self.adapters.oracle.as_ref();
                    let seen = fail_open_or("diff_wait_for", false, || {
                        oracle.wait_for(page, MODAL_VISIBLE, timing.modal_timeout())
                    })
                    .await;
                    debug!("No modal by selector; diff oracle saw one: {}", seen);
                }
            }
            Intent::ModalDismiss => {
                fail_open("wait_for_dismissal", || {
                    wait_for_dismissal(page, timing.modal_poll(), timing.modal_timeout())
                })
                .await;
                self.rebaseline().await;
            }
            click if click.is_plain_click() => {
                tokio::time::sleep(timing.stabilize()).await;
                let now = self.current_url().await;
                if url_path(&now) != url_path(pre_url) {
                    debug!("In-page navigation {} -> {}, re-baselining", pre_url, now);
                    self.rebaseline().await;
                }
            }
            _ => {}
        }
    }

    async fn failed_act(&self, started: Instant, error: AttestError) -> ActResult {
        let page = self.page();
        warn!("Act failed: {}", error);
        let mut result = ActResult::failed(started.elapsed(), error.to_string());
        result.page_url = Some(self.current_url().await);
        result.page_snapshot = fail_open("page_outline", || page_outline(page, SNAPSHOT_OUTLINE_LIMIT)).await;
        result.available_actions = fail_open_or("list_elements", Vec::new(), || {
            interactive_elements(page, CONTEXT_ELEMENT_LIMIT)
        })
        .await
        .iter()
        .map(|e| {
            if e.text.is_empty() {
                format!("{} {}", e.kind, e.selector)
            } else {
                format!("{} \"{}\" ({})", e.kind, e.text, e.selector)
            }
        })
        .collect();
        result
    }

    // ---- Check ----

    async fn run_check(&self, instruction: &str, runtime: &StepRuntime) -> CheckResult {
        let page = self.page();

        if let Some(check) = parse_deterministic(instruction) {
            return match inspect(page, &check).await {
                Ok(inspection) => {
                    CheckResult::new(inspection.passed, CheckKind::Deterministic, instruction, inspection.actual)
                }
                Err(e) => CheckResult::new(
                    false,
                    CheckKind::Deterministic,
                    instruction,
                    format!("Inspection failed: {}", e),
                ),
            };
        }

        if let Some(expectation) = quoted_text_expectation(instruction) {
            match text_presence(page, &expectation.phrase, expectation.present).await {
                Ok(inspection) if inspection.passed => {
                    return CheckResult::new(true, CheckKind::Deterministic, instruction, inspection.actual)
                        .with_reasoning("Literal text match on the rendered page");
                }
                Ok(inspection) => debug!("Literal text check inconclusive: {}", inspection.actual),
                Err(e) => debug!("Literal text check unavailable: {}", e),
            }
        }

        self.judge_semantic(instruction, runtime).await
    }

    async fn consult(&self, kind: OracleKind, instruction: &str) -> Result<Judgment> {
        match kind {
            OracleKind::Diff => self.adapters.oracle.assert(self.page(), instruction).await,
            OracleKind::Extract => judge_yes_no(self.adapters.judge.as_ref(), &extraction_prompt(instruction)).await,
        }
    }

    async fn judge_semantic(&self, instruction: &str, runtime: &StepRuntime) -> CheckResult {
        let current = self.current_url().await;
        let transition = PageTransition::between(runtime.last_act_url.as_deref(), &current);
        let plan = plan_for(transition);
        debug!("Semantic check on {:?} page, {} oracle first", transition, plan.primary);

        let max_attempts = self.retry.max_attempts();
        let mut notes: Vec<String> = Vec::new();

        for attempt in 1..=max_attempts {
            let mut state = CheckState::start(&plan);
            let mut fatal = false;
            let mut last_reasoning = String::new();
            notes.clear();

            while let Some(kind) = state.pending() {
                let passed = match self.consult(kind, instruction).await {
                    Ok(judgment) => {
                        notes.push(format!("{}: {}", kind, judgment.reasoning));
                        last_reasoning = judgment.reasoning;
                        judgment.passed
                    }
                    Err(e) => {
                        if !categorize_error(&e).is_retryable() {
                            fatal = true;
                        }
                        notes.push(format!("{} error: {}", kind, e));
                        false
                    }
                };
                debug!("Attempt {}/{}: {} oracle says {}", attempt, max_attempts, kind, passed);
                state = advance(state, &plan, passed);
            }

            if let CheckState::Passed { by, rescued } = state {
                if rescued {
                    info!("{} oracle rescued a {} oracle rejection", by, plan.primary);
                }
                return CheckResult::new(true, CheckKind::Semantic, instruction, last_reasoning.clone())
                    .with_reasoning(pass_reasoning(&plan, by, rescued, &last_reasoning));
            }

            if fatal || attempt == max_attempts {
                break;
            }
            tokio::time::sleep(self.retry.delay()).await;
        }

        let context = page_context_summary(self.page(), CONTEXT_ELEMENT_LIMIT).await;
        CheckResult::new(
            false,
            CheckKind::Semantic,
            instruction,
            format!("{} {}", notes.join("; "), context),
        )
        .with_reasoning(format!(
            "Neither oracle confirmed the condition ({} oracle first)",
            plan.primary
        ))
        .with_suggestion("Name the visible text or control the condition depends on, or split compound conditions")
    }
}

/// A failed nav click whose destination is already showing
fn already_at_target(intent: &Intent, url: &str) -> bool {
    let Intent::NavClick { target } = intent else {
        return false;
    };
    let url = url.to_lowercase();
    let lowered = target.trim().to_lowercase();
    let slug = slugify(target);
    (!lowered.is_empty() && url.contains(&lowered)) || (!slug.is_empty() && url.contains(&slug))
}
