//! Page control abstraction
//!
//! The engine never talks to a browser directly: it drives a [`PageControl`],
//! implemented by [`crate::BrowserSession`] for real runs and by
//! [`crate::testing::MockPage`] in tests.
//!
//! In-page scripts are tagged with a leading `/*attest:<tag>*/` comment so
//! mocks can answer them by name.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{AttestError, Result};

/// Raw browser capabilities consumed by the engine
#[async_trait]
pub trait PageControl: Send + Sync {
    /// Full navigation to an absolute URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Reload the current document
    async fn reload(&self) -> Result<()>;

    /// Wait until the page has settled or the timeout elapses
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Evaluate a script in the page and return its value
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Dispatch a key press (e.g. `Escape`)
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Click the element matched by a CSS selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Change location without a full reload, keeping in-memory app state
    async fn navigate_in_page(&self, path: &str) -> Result<()> {
        let script = tagged_script(
            "soft-navigate",
            &format!(
                "const path = {};\n\
                 window.history.pushState({{}}, '', path);\n\
                 window.dispatchEvent(new PopStateEvent('popstate', {{ state: {{}} }}));\n\
                 return window.location.href;",
                js_string(path)
            ),
        );
        self.evaluate(&script).await?;
        Ok(())
    }
}

/// Wrap a function body as a tagged, immediately-invoked script
pub fn tagged_script(tag: &str, body: &str) -> String {
    format!("/*attest:{}*/(() => {{\n{}\n}})()", tag, body)
}

/// Read the tag of a script built by [`tagged_script`]
pub fn script_tag(script: &str) -> Option<&str> {
    let rest = script.trim_start().strip_prefix("/*attest:")?;
    let end = rest.find("*/")?;
    Some(&rest[..end])
}

/// Encode a Rust string as a JavaScript string literal
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Evaluate a script and deserialize its result
///
/// Scripts return `JSON.stringify(...)` for structured values so the result
/// survives by-reference evaluation; plain values are accepted too.
pub async fn evaluate_json<T: DeserializeOwned>(page: &dyn PageControl, script: &str) -> Result<T> {
    let value = page.evaluate(script).await?;
    decode_value(value)
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    if let Value::String(text) = &value {
        if let Ok(parsed) = serde_json::from_str::<T>(text) {
            return Ok(parsed);
        }
    }
    serde_json::from_value(value)
        .map_err(|e| AttestError::Browser(format!("Unexpected script result: {}", e)))
}

/// Path component of a URL (`/` for a bare origin)
pub fn url_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => return strip_query(url).to_string(),
    };
    match without_scheme.find('/') {
        Some(idx) => strip_query(&without_scheme[idx..]).to_string(),
        None => "/".to_string(),
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Origin (`scheme://host[:port]`) of a URL
pub fn url_origin(url: &str) -> Option<String> {
    let idx = url.find("://")?;
    let rest = &url[idx + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    Some(format!("{}{}", &url[..idx + 3], &rest[..host_end]))
}

/// Resolve a root-relative path or absolute URL against a base URL
pub fn resolve_url(base: &str, target: &str) -> String {
    if target.contains("://") {
        return target.to_string();
    }
    let origin = url_origin(base).unwrap_or_else(|| base.trim_end_matches('/').to_string());
    if target.starts_with('/') {
        format!("{}{}", origin, target)
    } else {
        format!("{}/{}", origin, target)
    }
}
