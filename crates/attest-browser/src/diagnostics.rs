//! Failure diagnostics: page outline, interactive elements, remediation hints

use attest_core::fail_open::{fail_open, fail_open_or};
use attest_core::{FailureContext, InteractiveElement};
use tracing::debug;

use crate::error::Result;
use crate::page::{evaluate_json, tagged_script, PageControl};

/// Interactive elements attached to a final step failure
pub const FAILURE_ELEMENT_LIMIT: usize = 20;

/// Interactive elements attached to an enriched check failure
pub const CONTEXT_ELEMENT_LIMIT: usize = 10;

const FAILURE_OUTLINE_LIMIT: usize = 4_000;

fn interactive_elements_script(limit: usize) -> String {
    tagged_script(
        "interactive-elements",
        &format!(
            r#"const limit = {limit};
const visible = (el) => {{
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
}};
const selectorFor = (el) => {{
  if (el.id) return '#' + CSS.escape(el.id);
  const testId = el.getAttribute('data-testid');
  if (testId) return '[data-testid="' + testId + '"]';
  const name = el.getAttribute('name');
  if (name) return el.tagName.toLowerCase() + '[name="' + name + '"]';
  const label = el.getAttribute('aria-label');
  if (label) return '[aria-label="' + label + '"]';
  const siblings = el.parentElement ? Array.from(el.parentElement.children).filter(s => s.tagName === el.tagName) : [el];
  return el.tagName.toLowerCase() + ':nth-of-type(' + (siblings.indexOf(el) + 1) + ')';
}};
const keep = ['id', 'name', 'type', 'href', 'role', 'aria-label', 'placeholder', 'value'];
const nodes = document.querySelectorAll('a[href], button, input, select, textarea, [role="button"], [role="link"], [role="tab"], [role="menuitem"], [role="checkbox"], [role="radio"], [role="option"], [contenteditable="true"]');
const out = [];
for (const el of nodes) {{
  if (out.length >= limit) break;
  if (!visible(el)) continue;
  out.push({{
    kind: el.getAttribute('role') || el.tagName.toLowerCase(),
    text: (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().slice(0, 80),
    selector: selectorFor(el),
    attributes: keep.filter(n => el.hasAttribute(n)).map(n => ({{ name: n, value: String(el.getAttribute(n)).slice(0, 80) }}))
  }});
}}
return JSON.stringify(out);"#
        ),
    )
}

fn page_outline_script(max_chars: usize) -> String {
    tagged_script(
        "page-outline",
        &format!(
            r#"const maxChars = {max_chars};
const lines = [];
let size = 0;
const walk = (el, depth) => {{
  if (size > maxChars || depth > 25) return;
  const style = window.getComputedStyle(el);
  if (style.display === 'none' || style.visibility === 'hidden') return;
  const tag = el.tagName.toLowerCase();
  if (['script', 'style', 'noscript', 'svg', 'template'].includes(tag)) return;
  const role = el.getAttribute('role');
  const label = el.getAttribute('aria-label');
  let own = '';
  for (const node of el.childNodes) {{
    if (node.nodeType === Node.TEXT_NODE) own += node.textContent;
  }}
  own = own.replace(/\s+/g, ' ').trim().slice(0, 120);
  let line = '  '.repeat(depth) + tag;
  if (role) line += '[role=' + role + ']';
  if (label) line += '[aria-label=' + label + ']';
  if (el.value !== undefined && el.value !== '' && tag !== 'li' && tag !== 'option') line += '[value=' + String(el.value).slice(0, 60) + ']';
  if (el.checked) line += '[checked]';
  if (own) line += ' "' + own + '"';
  lines.push(line);
  size += line.length + 1;
  for (const child of el.children) walk(child, depth + 1);
}};
if (document.body) walk(document.body, 0);
return lines.join('\n').slice(0, maxChars);"#
        ),
    )
}

/// List visible interactive elements (type, text, selector, key attributes)
pub async fn interactive_elements(page: &dyn PageControl, limit: usize) -> Result<Vec<InteractiveElement>> {
    evaluate_json(page, &interactive_elements_script(limit)).await
}

/// Indented structural outline of the visible DOM
pub async fn page_outline(page: &dyn PageControl, max_chars: usize) -> Result<String> {
    evaluate_json(page, &page_outline_script(max_chars)).await
}

/// One-line live page context used to enrich failure messages
///
/// Never fails: unreadable parts are left blank.
pub async fn page_context_summary(page: &dyn PageControl, limit: usize) -> String {
    let url = fail_open_or("read_url", String::new(), || page.current_url()).await;
    let title = fail_open_or("read_title", String::new(), || page.title()).await;
    let elements = fail_open_or("list_elements", Vec::new(), || interactive_elements(page, limit)).await;

    let controls: Vec<String> = elements
        .iter()
        .map(|e| {
            if e.text.is_empty() {
                format!("{} {}", e.kind, e.selector)
            } else {
                format!("{} \"{}\"", e.kind, e.text)
            }
        })
        .collect();

    format!(
        "[page: \"{}\" at {}; visible controls: {}]",
        title,
        url,
        if controls.is_empty() {
            "none".to_string()
        } else {
            controls.join(", ")
        }
    )
}

/// Pages that indicate the session was lost or the app errored
pub fn is_unexpected_page(url: &str) -> bool {
    let path = crate::page::url_path(url).to_lowercase();
    path.split('/').any(|segment| {
        matches!(
            segment,
            "login" | "signin" | "sign-in" | "log-in" | "auth" | "error" | "404" | "500"
        )
    })
}

/// Heuristic remediation hints keyed off the error shape
pub fn suggestions_for(error: &str, page_url: &str) -> Vec<String> {
    let lower = error.to_lowercase();
    let mut suggestions = Vec::new();

    if is_unexpected_page(page_url) {
        suggestions.push(format!(
            "The page is {}, which looks like a sign-in or error page; the session may have been lost or a dependency did not complete",
            page_url
        ));
        suggestions.push("Retrying the same instruction on this page cannot succeed; check the behavior's dependencies".to_string());
    }

    if lower.contains("not found")
        || lower.contains("no element")
        || lower.contains("could not find")
        || lower.contains("unable to find")
    {
        suggestions.push("Compare the instruction's wording with the visible controls listed below".to_string());
        suggestions.push("The element may lack an accessible name; add an aria-label or visible text".to_string());
        suggestions.push("The element may render after a delay; add a Check that waits for it first".to_string());
    } else if lower.contains("timeout") || lower.contains("timed out") {
        suggestions.push("The page did not settle in time; the application may be slow or stuck loading".to_string());
        suggestions.push("Verify the application server is running and reachable".to_string());
    } else if suggestions.is_empty() {
        suggestions.push("Rephrase the instruction to name the visible label of the target control".to_string());
    }

    suggestions
}

/// Capture the diagnostics bundle for a failed step
///
/// Never fails: diagnostics are best-effort.
pub async fn capture_failure(page: &dyn PageControl, instruction: &str, error: &str) -> FailureContext {
    let page_url = fail_open_or("read_url", String::new(), || page.current_url()).await;
    let page_title = fail_open_or("read_title", String::new(), || page.title()).await;
    let outline = fail_open("page_outline", || page_outline(page, FAILURE_OUTLINE_LIMIT)).await;
    let elements = fail_open_or("list_elements", Vec::new(), || {
        interactive_elements(page, FAILURE_ELEMENT_LIMIT)
    })
    .await;

    debug!("Captured failure context at {} ({} elements)", page_url, elements.len());

    FailureContext {
        instruction: instruction.to_string(),
        suggestions: suggestions_for(error, &page_url),
        page_url,
        page_title,
        page_outline: outline,
        elements,
        error: error.to_string(),
    }
}
