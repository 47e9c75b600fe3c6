//! Deterministic page inspection
//!
//! Resolves checks by reading the live page directly: URL, title, element
//! counts, input values, checkbox state and rendered text. No judgment is
//! involved.

use attest_core::DeterministicCheck;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::page::{evaluate_json, js_string, tagged_script, url_path, PageControl};

/// Outcome of a literal page inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub passed: bool,
    /// What the page actually showed
    pub actual: String,
}

impl Inspection {
    fn new(passed: bool, actual: impl Into<String>) -> Self {
        Self {
            passed,
            actual: actual.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FieldState {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    checked: Option<bool>,
}

/// Shared JS: locate a form control by label, placeholder, name, id or aria-label
const FIND_FIELD: &str = r#"const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const findField = (name, selector) => {
  const wanted = norm(name);
  const controls = Array.from(document.querySelectorAll(selector));
  if (!wanted) return controls[0] || null;
  for (const label of document.querySelectorAll('label')) {
    if (norm(label.innerText).includes(wanted)) {
      const target = label.control || label.querySelector(selector);
      if (target && controls.includes(target)) return target;
    }
  }
  return controls.find(el =>
    norm(el.getAttribute('placeholder')) === wanted ||
    norm(el.getAttribute('name')) === wanted ||
    norm(el.id) === wanted ||
    norm(el.getAttribute('aria-label')) === wanted
  ) || controls.find(el =>
    norm(el.getAttribute('placeholder')).includes(wanted) ||
    norm(el.getAttribute('aria-label')).includes(wanted)
  ) || null;
};"#;

fn input_value_script(field: &str) -> String {
    tagged_script(
        "input-value",
        &format!(
            "{}\nconst el = findField({}, 'input, textarea, select');\n\
             return JSON.stringify(el ? {{ found: true, value: el.value }} : {{ found: false }});",
            FIND_FIELD,
            js_string(field)
        ),
    )
}

fn checkbox_script(field: Option<&str>) -> String {
    tagged_script(
        "checkbox-state",
        &format!(
            "{}\nconst el = findField({}, 'input[type=\"checkbox\"], [role=\"checkbox\"]');\n\
             if (!el) return JSON.stringify({{ found: false }});\n\
             const checked = el.matches('input') ? el.checked : el.getAttribute('aria-checked') === 'true';\n\
             return JSON.stringify({{ found: true, checked }});",
            FIND_FIELD,
            js_string(field.unwrap_or(""))
        ),
    )
}

fn element_count_script(target: &str) -> String {
    tagged_script(
        "element-count",
        &format!(
            r#"const target = {};
let count = 0;
try {{
  count = document.querySelectorAll(target).length;
}} catch (e) {{
  count = 0;
}}
if (count === 0) {{
  const wanted = target.replace(/\s+/g, ' ').trim().toLowerCase();
  count = Array.from(document.body ? document.body.querySelectorAll('*') : [])
    .filter(el => el.children.length === 0 && (el.innerText || '').replace(/\s+/g, ' ').trim().toLowerCase() === wanted)
    .length;
}}
return count;"#,
            js_string(target)
        ),
    )
}

fn body_text_script() -> String {
    tagged_script(
        "body-text",
        "return document.body ? document.body.innerText : '';",
    )
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn urls_equal(actual: &str, expected: &str) -> bool {
    let trim = |s: &str| s.trim_end_matches('/').to_string();
    trim(actual) == trim(expected) || trim(&url_path(actual)) == trim(expected)
}

/// Resolve a deterministic check against the live page
pub async fn inspect(page: &dyn PageControl, check: &DeterministicCheck) -> Result<Inspection> {
    debug!("Inspecting page for {:?}", check);

    let inspection = match check {
        DeterministicCheck::UrlContains { expected } => {
            let url = page.current_url().await?;
            Inspection::new(url.contains(expected.as_str()), url)
        }
        DeterministicCheck::UrlIs { expected } => {
            let url = page.current_url().await?;
            Inspection::new(urls_equal(&url, expected), url)
        }
        DeterministicCheck::TitleIs { expected } => {
            let title = page.title().await?;
            Inspection::new(title.trim() == expected.trim(), title)
        }
        DeterministicCheck::TitleContains { expected } => {
            let title = page.title().await?;
            Inspection::new(normalize(&title).contains(&normalize(expected)), title)
        }
        DeterministicCheck::ElementCount { target, count } => {
            let found: usize = evaluate_json(page, &element_count_script(target)).await?;
            Inspection::new(found == *count, format!("{} matching element(s)", found))
        }
        DeterministicCheck::InputValue { field, expected } => {
            let state: FieldState = evaluate_json(page, &input_value_script(field)).await?;
            match (state.found, state.value) {
                (true, Some(value)) => Inspection::new(value == *expected, format!("value {:?}", value)),
                _ => Inspection::new(false, format!("no field matching {:?}", field)),
            }
        }
        DeterministicCheck::Checkbox { field, checked } => {
            let state: FieldState = evaluate_json(page, &checkbox_script(field.as_deref())).await?;
            match (state.found, state.checked) {
                (true, Some(actual)) => Inspection::new(
                    actual == *checked,
                    if actual { "checked" } else { "unchecked" },
                ),
                _ => Inspection::new(false, "no matching checkbox"),
            }
        }
    };

    debug!("Inspection passed={} actual={:?}", inspection.passed, inspection.actual);
    Ok(inspection)
}

/// Test whether `phrase` is (or is not) present in the rendered text
///
/// Matching is case-insensitive and whitespace-normalized.
pub async fn text_presence(page: &dyn PageControl, phrase: &str, expect_present: bool) -> Result<Inspection> {
    let body: String = evaluate_json(page, &body_text_script()).await?;
    let present = normalize(&body).contains(&normalize(phrase));
    let actual = if present {
        format!("{:?} is present in the page text", phrase)
    } else {
        format!("{:?} is not present in the page text", phrase)
    };
    Ok(Inspection::new(present == expect_present, actual))
}
