//! Modal detection and dismissal
//!
//! One structural query finds the first visible dialog or overlay and reports
//! the facts about its buttons. Selector choice happens here, in Rust:
//! identifier-based selectors win over positional ones, and cancel-style
//! controls are never picked as the confirm action.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use attest_core::ModalDetection;

use crate::agent::ActionAgent;
use crate::error::Result;
use crate::page::{evaluate_json, tagged_script, PageControl};

const CONFIRM_WORDS: &[&str] = &[
    "confirm", "ok", "okay", "yes", "delete", "remove", "archive", "submit", "save", "apply", "approve",
];

const CANCEL_WORDS: &[&str] = &["cancel", "close", "dismiss", "no", "back", "keep"];

/// Instruction handed to the agent when no confirm control can be identified
pub const CONFIRM_INSTRUCTION: &str = "Click the confirm button in the dialog";

const DETECT_SCRIPT: &str = r#"const STRUCTURAL = '[role="dialog"], [role="alertdialog"], dialog[open], [aria-modal="true"]';
const HEURISTIC = '[class*="modal" i], [class*="dialog" i], [class*="overlay" i]';
const pageRoot = (el) => el === document.documentElement || el === document.body;
const candidates = Array.from(document.querySelectorAll(STRUCTURAL))
  .concat(Array.from(document.querySelectorAll(HEURISTIC)).filter(el => !el.matches(STRUCTURAL)))
  .filter(el => !pageRoot(el));
const visible = (el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none' && style.opacity !== '0';
};
const structural = (el) => el.matches(STRUCTURAL);
for (const el of candidates) {
  if (!visible(el)) continue;
  if (!structural(el) && !el.querySelector('button, input, a[href], [role="button"]')) continue;
  const buttons = Array.from(el.querySelectorAll('button, [role="button"], input[type="submit"], input[type="button"]'))
    .filter(visible)
    .map((b) => {
      const siblings = b.parentElement ? Array.from(b.parentElement.children).filter(s => s.tagName === b.tagName) : [b];
      return {
        tag: b.tagName.toLowerCase(),
        id: b.id || null,
        test_id: b.getAttribute('data-testid'),
        name: b.getAttribute('name'),
        aria_label: b.getAttribute('aria-label'),
        text: (b.innerText || b.value || '').trim().slice(0, 80),
        nth_of_type: siblings.indexOf(b) + 1
      };
    });
  return JSON.stringify({
    tag: el.tagName.toLowerCase(),
    id: el.id || null,
    test_id: el.getAttribute('data-testid'),
    role: el.getAttribute('role'),
    class_name: typeof el.className === 'string' ? el.className : null,
    buttons
  });
}
return null;"#;

/// Raw facts about a button inside a detected modal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ButtonFacts {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub nth_of_type: usize,
}

/// Raw facts about the first visible modal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModalFacts {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub buttons: Vec<ButtonFacts>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn id_selector(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{}", id)
    } else {
        format!("[id=\"{}\"]", id.replace('"', "\\\""))
    }
}

fn attr_selector(name: &str, value: &str) -> String {
    format!("[{}=\"{}\"]", name, value.replace('"', "\\\""))
}

impl ButtonFacts {
    /// Accessible name: aria-label, else visible text
    pub fn label(&self) -> String {
        non_empty(&self.aria_label)
            .map(str::to_string)
            .unwrap_or_else(|| self.text.trim().to_string())
    }

    fn words(&self) -> Vec<String> {
        self.label()
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn has_word(&self, vocabulary: &[&str]) -> bool {
        self.words().iter().any(|w| vocabulary.contains(&w.as_str()))
    }

    pub fn is_cancel(&self) -> bool {
        self.has_word(CANCEL_WORDS)
    }

    pub fn is_confirm(&self) -> bool {
        !self.is_cancel() && self.has_word(CONFIRM_WORDS)
    }

    /// Best selector: id, test id, name, aria-label, then position
    pub fn selector(&self, modal_selector: &str) -> String {
        let tag = if self.tag.is_empty() { "button" } else { self.tag.as_str() };
        if let Some(id) = non_empty(&self.id) {
            id_selector(id)
        } else if let Some(test_id) = non_empty(&self.test_id) {
            attr_selector("data-testid", test_id)
        } else if let Some(name) = non_empty(&self.name) {
            format!("{} {}{}", modal_selector, tag, attr_selector("name", name))
        } else if let Some(label) = non_empty(&self.aria_label) {
            format!("{} {}", modal_selector, attr_selector("aria-label", label))
        } else {
            format!("{} {}:nth-of-type({})", modal_selector, tag, self.nth_of_type.max(1))
        }
    }
}

impl ModalFacts {
    /// `<html>` or `<body>` matched by a class such as `modal-open`
    pub fn is_page_root(&self) -> bool {
        self.tag.eq_ignore_ascii_case("html") || self.tag.eq_ignore_ascii_case("body")
    }

    /// Best selector for the modal container itself
    pub fn selector(&self) -> String {
        if let Some(id) = non_empty(&self.id) {
            return id_selector(id);
        }
        if let Some(test_id) = non_empty(&self.test_id) {
            return attr_selector("data-testid", test_id);
        }
        if let Some(role) = non_empty(&self.role) {
            if role == "dialog" || role == "alertdialog" {
                return attr_selector("role", role);
            }
        }
        if self.tag == "dialog" {
            return "dialog[open]".to_string();
        }
        if let Some(class) = self.class_name.as_deref().and_then(|classes| {
            classes.split_whitespace().find(|c| {
                let lower = c.to_lowercase();
                is_css_ident(c) && ["modal", "dialog", "overlay"].iter().any(|k| lower.contains(k))
            })
        }) {
            return format!("{}.{}", self.tag, class);
        }
        if self.tag.is_empty() {
            "[aria-modal=\"true\"]".to_string()
        } else {
            self.tag.clone()
        }
    }

    pub fn confirm_selector(&self) -> Option<String> {
        let modal = self.selector();
        self.buttons
            .iter()
            .find(|b| b.is_confirm())
            .map(|b| b.selector(&modal))
    }

    pub fn cancel_selector(&self) -> Option<String> {
        let modal = self.selector();
        self.buttons
            .iter()
            .find(|b| b.is_cancel())
            .map(|b| b.selector(&modal))
    }

    pub fn detection(&self) -> ModalDetection {
        ModalDetection {
            modal_selector: self.selector(),
            confirm_selector: self.confirm_selector(),
        }
    }
}

async fn modal_facts(page: &dyn PageControl) -> Result<Option<ModalFacts>> {
    let facts: Option<ModalFacts> = evaluate_json(page, &tagged_script("modal-detect", DETECT_SCRIPT)).await?;
    Ok(facts.filter(|f| !f.is_page_root()))
}

/// Find the first visible modal and its confirm control, if any
pub async fn detect_modal(page: &dyn PageControl) -> Result<Option<ModalDetection>> {
    let detection = modal_facts(page).await?.map(|facts| facts.detection());
    if let Some(d) = &detection {
        debug!("Modal detected: {} (confirm: {:?})", d.modal_selector, d.confirm_selector);
    }
    Ok(detection)
}

/// Poll until a modal is visible or the timeout elapses
pub async fn wait_for_modal(page: &dyn PageControl, poll: Duration, timeout: Duration) -> Result<Option<ModalDetection>> {
    let started = Instant::now();
    loop {
        if let Some(detection) = detect_modal(page).await? {
            return Ok(Some(detection));
        }
        if started.elapsed() >= timeout {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Poll until no modal is visible; returns false on timeout
pub async fn wait_for_dismissal(page: &dyn PageControl, poll: Duration, timeout: Duration) -> Result<bool> {
    let started = Instant::now();
    loop {
        if modal_facts(page).await?.is_none() {
            return Ok(true);
        }
        if started.elapsed() >= timeout {
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Confirm the visible modal and wait for it to close
///
/// Clicks the identified confirm control, or asks the agent to find one.
/// Returns false when no modal is visible or it never closed.
pub async fn auto_confirm(
    page: &dyn PageControl,
    agent: &dyn ActionAgent,
    poll: Duration,
    timeout: Duration,
) -> Result<bool> {
    let Some(detection) = detect_modal(page).await? else {
        debug!("No modal to confirm");
        return Ok(false);
    };

    let clicked = match &detection.confirm_selector {
        Some(selector) => match page.click(selector).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Confirm click on {} failed: {}", selector, e);
                false
            }
        },
        None => false,
    };

    if !clicked {
        let outcome = agent.act(CONFIRM_INSTRUCTION).await?;
        if !outcome.success {
            warn!("Agent could not confirm modal: {}", outcome.message);
            return Ok(false);
        }
    }

    let dismissed = wait_for_dismissal(page, poll, timeout).await?;
    info!("Modal {} confirmed (closed: {})", detection.modal_selector, dismissed);
    Ok(dismissed)
}

/// Close a leftover modal: Escape, then a cancel/close control, then Escape again
///
/// Returns true when no modal remains.
pub async fn dismiss_leftover(page: &dyn PageControl, poll: Duration, timeout: Duration) -> Result<bool> {
    let Some(facts) = modal_facts(page).await? else {
        return Ok(true);
    };

    page.press_key("Escape").await?;
    if wait_for_dismissal(page, poll, timeout).await? {
        debug!("Modal closed with Escape");
        return Ok(true);
    }

    if let Some(selector) = facts.cancel_selector() {
        match page.click(&selector).await {
            Ok(()) => {
                if wait_for_dismissal(page, poll, timeout).await? {
                    debug!("Modal closed with {}", selector);
                    return Ok(true);
                }
            }
            Err(e) => warn!("Cancel click on {} failed: {}", selector, e),
        }
    }

    page.press_key("Escape").await?;
    let closed = wait_for_dismissal(page, poll, timeout).await?;
    if !closed {
        warn!("Modal {} is still visible after dismissal attempts", facts.selector());
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAgent, MockPage};
    use serde_json::{json, Value};

    const NO_WAIT: Duration = Duration::from_millis(0);

    fn button(text: &str) -> ButtonFacts {
        ButtonFacts {
            tag: "button".to_string(),
            text: text.to_string(),
            nth_of_type: 1,
            ..Default::default()
        }
    }

    fn delete_dialog() -> Value {
        json!({
            "tag": "div",
            "role": "dialog",
            "class_name": "modal fade show",
            "buttons": [
                { "tag": "button", "text": "Cancel", "nth_of_type": 1 },
                { "tag": "button", "text": "Delete", "nth_of_type": 2 }
            ]
        })
    }

    #[test]
    fn test_confirm_prefers_identifier() {
        let mut confirm = button("Yes, delete");
        confirm.id = Some("confirm-delete".to_string());
        let facts = ModalFacts {
            tag: "div".to_string(),
            role: Some("dialog".to_string()),
            buttons: vec![button("Cancel"), confirm],
            ..Default::default()
        };

        assert_eq!(facts.confirm_selector().as_deref(), Some("#confirm-delete"));
        assert_eq!(
            facts.cancel_selector().as_deref(),
            Some("[role=\"dialog\"] button:nth-of-type(1)")
        );
    }

    #[test]
    fn test_confirm_skips_cancel_labels() {
        let facts = ModalFacts {
            tag: "dialog".to_string(),
            buttons: vec![button("No, keep it"), button("Close")],
            ..Default::default()
        };
        assert!(facts.confirm_selector().is_none());
        assert_eq!(facts.selector(), "dialog[open]");
    }

    #[test]
    fn test_positional_fallback_and_testid() {
        let mut save = button("Save changes");
        save.nth_of_type = 2;
        let mut facts = ModalFacts {
            tag: "div".to_string(),
            class_name: Some("app-overlay visible".to_string()),
            buttons: vec![save],
            ..Default::default()
        };
        assert_eq!(
            facts.confirm_selector().as_deref(),
            Some("div.app-overlay button:nth-of-type(2)")
        );

        facts.buttons[0].test_id = Some("save-btn".to_string());
        assert_eq!(facts.confirm_selector().as_deref(), Some("[data-testid=\"save-btn\"]"));
    }

    #[tokio::test]
    async fn test_detect_none_without_modal() {
        let page = MockPage::new("http://localhost:3000/");
        assert!(detect_modal(&page).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_with_modal_class_is_not_a_modal() {
        let body = json!({
            "tag": "body",
            "class_name": "modal-open",
            "buttons": [{ "tag": "button", "text": "Delete account" }]
        });
        let page = MockPage::new("http://localhost:3000/").with_script("modal-detect", body);
        let agent = MockAgent::new();

        assert!(detect_modal(&page).await.unwrap().is_none());
        assert!(!auto_confirm(&page, &agent, NO_WAIT, NO_WAIT).await.unwrap());
        assert!(!page.calls().iter().any(|c| c.starts_with("page:click")));
    }

    #[test]
    fn test_structural_candidates_are_queried_first() {
        let structural = DETECT_SCRIPT.find("querySelectorAll(STRUCTURAL)").unwrap();
        let heuristic = DETECT_SCRIPT.find("querySelectorAll(HEURISTIC)").unwrap();
        assert!(structural < heuristic);
        assert!(DETECT_SCRIPT.contains("!pageRoot(el)"));
    }

    #[tokio::test]
    async fn test_auto_confirm_clicks_confirm_control() {
        let page = MockPage::new("http://localhost:3000/tasks")
            .with_script_sequence("modal-detect", vec![delete_dialog(), Value::Null]);
        let agent = MockAgent::new();

        let closed = auto_confirm(&page, &agent, NO_WAIT, NO_WAIT).await.unwrap();
        assert!(closed);
        assert!(page
            .calls()
            .contains(&"page:click [role=\"dialog\"] button:nth-of-type(2)".to_string()));
        assert!(agent.acts().is_empty());
    }

    #[tokio::test]
    async fn test_auto_confirm_asks_agent_without_confirm_control() {
        let dialog = json!({ "tag": "dialog", "buttons": [{ "tag": "button", "text": "Cancel" }] });
        let page = MockPage::new("http://localhost:3000/").with_script_sequence("modal-detect", vec![dialog, Value::Null]);
        let agent = MockAgent::new();

        assert!(auto_confirm(&page, &agent, NO_WAIT, NO_WAIT).await.unwrap());
        assert_eq!(agent.acts(), vec![CONFIRM_INSTRUCTION.to_string()]);
    }

    #[tokio::test]
    async fn test_dismiss_leftover_escalates_to_cancel() {
        // Escape leaves it open, the cancel click closes it
        let page = MockPage::new("http://localhost:3000/").with_script_sequence(
            "modal-detect",
            vec![delete_dialog(), delete_dialog(), Value::Null],
        );

        assert!(dismiss_leftover(&page, NO_WAIT, NO_WAIT).await.unwrap());
        let calls = page.calls();
        assert!(calls.contains(&"page:press Escape".to_string()));
        assert!(calls.contains(&"page:click [role=\"dialog\"] button:nth-of-type(1)".to_string()));
    }
}
