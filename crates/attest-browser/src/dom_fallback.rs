//! DOM-level fallbacks for controls the agent cannot drive
//!
//! Native `<select>` elements and un-labelled custom widgets often sit outside
//! what the instruction-following agent perceives. These helpers act on the
//! DOM directly and dispatch the same events a user interaction would.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::page::{evaluate_json, js_string, tagged_script, PageControl};

/// Shared JS: resolve a CSS selector or an `xpath=` / `/` prefixed XPath
const RESOLVE: &str = r#"const resolve = (sel) => {
  try {
    if (sel.startsWith('xpath=') || sel.startsWith('/')) {
      const expr = sel.startsWith('xpath=') ? sel.slice(6) : sel;
      return document.evaluate(expr, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    }
    return document.querySelector(sel);
  } catch (e) {
    return null;
  }
};
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const fire = (el) => {
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
};
const choose = (select, wanted) => {
  const options = Array.from(select.options);
  const option = options.find(o => norm(o.label || o.text) === wanted) || options.find(o => norm(o.value) === wanted);
  if (!option) return false;
  select.value = option.value;
  option.selected = true;
  fire(select);
  return true;
};"#;

/// How a last-resort click was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMatch {
    /// Exact visible text on a leaf element, then on a wrapper
    Text,
    /// Radio or checkbox by value or label
    Choice,
    /// Numeric range input set to the target value
    Range,
    /// aria-label or data-value attribute
    Attribute,
}

/// Lower-case tag name of the element behind a selector
pub async fn element_tag(page: &dyn PageControl, selector: &str) -> Result<Option<String>> {
    let script = tagged_script(
        "element-kind",
        &format!(
            "{}\nconst el = resolve({});\nreturn el ? el.tagName.toLowerCase() : null;",
            RESOLVE,
            js_string(selector)
        ),
    );
    evaluate_json(page, &script).await
}

/// Select an option on a native `<select>`, by label first, then by value
pub async fn select_native(page: &dyn PageControl, selector: &str, value: &str) -> Result<bool> {
    let script = tagged_script(
        "select-native",
        &format!(
            "{}\nconst el = resolve({});\n\
             if (!el || el.tagName !== 'SELECT') return false;\n\
             return choose(el, norm({}));",
            RESOLVE,
            js_string(selector),
            js_string(value)
        ),
    );
    let selected: Option<bool> = evaluate_json(page, &script).await?;
    let selected = selected.unwrap_or(false);
    debug!("Native select {} -> {:?}: {}", selector, value, selected);
    Ok(selected)
}

/// Scan visible `<select>` elements for an option matching `value`
///
/// Selects whose label, name, id or aria-label mention `field` are tried first.
pub async fn select_by_scan(page: &dyn PageControl, field: &str, value: &str) -> Result<bool> {
    let script = tagged_script(
        "select-scan",
        &format!(
            r#"{}
const field = norm({});
const wanted = norm({});
const visible = (el) => {{
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0 && window.getComputedStyle(el).visibility !== 'hidden';
}};
const describe = (el) => norm([
  el.labels && el.labels.length ? el.labels[0].innerText : '',
  el.getAttribute('name'),
  el.id,
  el.getAttribute('aria-label')
].join(' '));
const selects = Array.from(document.querySelectorAll('select')).filter(visible);
const ordered = field
  ? selects.filter(s => describe(s).includes(field)).concat(selects.filter(s => !describe(s).includes(field)))
  : selects;
for (const select of ordered) {{
  if (choose(select, wanted)) return true;
}}
return false;"#,
            RESOLVE,
            js_string(field),
            js_string(value)
        ),
    );
    let selected: Option<bool> = evaluate_json(page, &script).await?;
    Ok(selected.unwrap_or(false))
}

/// Last-resort click by visible text or attributes
///
/// Tries, in order: exact text on leaf elements then wrappers, radio or
/// checkbox by value or label, range inputs set to a numeric target, then
/// aria-label / data-value. Returns how the element was matched.
pub async fn click_by_text(page: &dyn PageControl, target: &str) -> Result<Option<ClickMatch>> {
    let script = tagged_script(
        "click-by-text",
        &format!(
            r#"{}
const raw = {};
const wanted = norm(raw);
const visible = (el) => {{
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
}};
const all = Array.from(document.body ? document.body.querySelectorAll('*') : []).filter(visible);
const textOf = (el) => norm(el.innerText || el.textContent);
const leaf = all.find(el => el.children.length === 0 && textOf(el) === wanted);
const wrapper = leaf || all.filter(el => el.children.length > 0 && textOf(el) === wanted).pop();
if (wrapper) {{
  wrapper.click();
  return JSON.stringify('text');
}}
for (const input of document.querySelectorAll('input[type="radio"], input[type="checkbox"]')) {{
  const label = input.labels && input.labels.length ? norm(input.labels[0].innerText) : '';
  if (norm(input.value) === wanted || label === wanted) {{
    input.click();
    return JSON.stringify('choice');
  }}
}}
const number = parseFloat(raw);
if (!Number.isNaN(number)) {{
  const range = Array.from(document.querySelectorAll('input[type="range"]')).find(visible);
  if (range) {{
    range.value = String(number);
    fire(range);
    return JSON.stringify('range');
  }}
}}
const attributed = all.find(el => norm(el.getAttribute('aria-label')) === wanted || norm(el.getAttribute('data-value')) === wanted);
if (attributed) {{
  attributed.click();
  return JSON.stringify('attribute');
}}
return null;"#,
            RESOLVE,
            js_string(target)
        ),
    );
    let matched: Option<ClickMatch> = evaluate_json(page, &script).await?;
    debug!("DOM click fallback for {:?}: {:?}", target, matched);
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPage;
    use serde_json::json;

    #[tokio::test]
    async fn test_element_tag() {
        let page = MockPage::new("http://localhost:3000/").with_script("element-kind", json!("select"));
        assert_eq!(
            element_tag(&page, "xpath=//select[1]").await.unwrap().as_deref(),
            Some("select")
        );

        let empty = MockPage::new("http://localhost:3000/");
        assert!(element_tag(&empty, "#missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_results() {
        let page = MockPage::new("http://localhost:3000/")
            .with_script("select-native", json!(true))
            .with_script("select-scan", json!(false));

        assert!(select_native(&page, "#priority", "High").await.unwrap());
        assert!(!select_by_scan(&page, "priority", "Urgent").await.unwrap());
    }

    #[tokio::test]
    async fn test_click_by_text_reports_strategy() {
        let page = MockPage::new("http://localhost:3000/").with_script("click-by-text", json!("\"choice\""));
        assert_eq!(click_by_text(&page, "Medium").await.unwrap(), Some(ClickMatch::Choice));

        let page = MockPage::new("http://localhost:3000/");
        assert_eq!(click_by_text(&page, "Nowhere").await.unwrap(), None);
    }
}
