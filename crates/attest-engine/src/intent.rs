//! Intent table for Act instructions
//!
//! Natural-language sniffing is kept as an ordered table of
//! `{name, pattern, builder}` rows. The first matching row wins; an
//! instruction matching none is [`Intent::Other`].

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// What an Act instruction is trying to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Go to an absolute URL or root-relative path
    Navigate { target: String },
    Refresh,
    /// Pick `value` in the selection control described by `field`
    Select { field: String, value: String },
    /// Close a dialog without confirming it
    ModalDismiss,
    /// Accept the action a dialog asks about
    ModalConfirm,
    /// Submit the acting form
    Save,
    /// A click expected to open a dialog
    ModalTrigger,
    /// Click on a navigation item (link, tab, menu entry)
    NavClick { target: String },
    /// Any other click, press or tap
    Click,
    Other,
}

impl Intent {
    /// Click-like intents that get generic post-action stabilization
    pub fn is_plain_click(&self) -> bool {
        matches!(self, Intent::Click | Intent::NavClick { .. })
    }
}

/// One row of the intent table
pub struct IntentRule {
    pub name: &'static str,
    pub pattern: &'static str,
    build: fn(&Captures) -> Intent,
}

fn group(caps: &Captures, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

const RULES: &[IntentRule] = &[
    IntentRule {
        name: "navigate",
        pattern: r#"(?i)^\s*(?:navigate|go|open|visit|browse)\s+(?:to\s+)?(?:the\s+)?(?:url\s+|page\s+)?['"]?((?:https?://|/)[^'"\s]*)['"]?\s*\.?\s*$"#,
        build: |caps| Intent::Navigate { target: group(caps, 1) },
    },
    IntentRule {
        name: "refresh",
        pattern: r"(?i)^\s*(?:refresh|reload)(?:\s+the)?(?:\s+(?:current\s+)?(?:page|browser|tab))?\s*\.?\s*$",
        build: |_| Intent::Refresh,
    },
    IntentRule {
        name: "select-from",
        pattern: r#"(?i)^\s*(?:select|choose|pick)\s+['"]([^'"]+)['"]\s+(?:from|in)\s+(?:the\s+)?(.+?)(?:\s+(?:dropdown|select|menu|list|picker|field))?\s*\.?\s*$"#,
        build: |caps| Intent::Select {
            field: group(caps, 2),
            value: group(caps, 1),
        },
    },
    IntentRule {
        name: "select-to",
        pattern: r#"(?i)^\s*(?:select|choose|change|set)\s+(?:the\s+)?(.+?)(?:\s+(?:dropdown|select|menu|list|picker|field))?\s+to\s+['"]([^'"]+)['"]\s*\.?\s*$"#,
        build: |caps| Intent::Select {
            field: group(caps, 1),
            value: group(caps, 2),
        },
    },
    IntentRule {
        name: "modal-dismiss",
        pattern: r#"(?i)(?:\b(?:close|dismiss|cancel)\b.*\b(?:dialog|modal|popup|pop-up|overlay)\b|\bclick\s+(?:on\s+)?(?:the\s+)?['"]?(?:cancel|close|no)['"]?(?:\s+button)?\s+(?:in|on)\s+the\s+(?:dialog|modal|popup)\b|^\s*press\s+(?:the\s+)?escape\b)"#,
        build: |_| Intent::ModalDismiss,
    },
    IntentRule {
        name: "modal-confirm",
        pattern: r#"(?i)(?:\b(?:confirm|accept|approve)\s+(?:the\s+)?(?:dialog|modal|prompt|popup|deletion|removal|action)\b|\b(?:in|on)\s+the\s+(?:confirmation\s+)?(?:dialog|modal|popup)\b)"#,
        build: |_| Intent::ModalConfirm,
    },
    IntentRule {
        name: "save",
        pattern: r#"(?i)^\s*(?:(?:click|press|tap)\s+(?:on\s+)?(?:the\s+)?['"]?(?:save|submit)\b|(?:save|submit)\s+(?:the\s+)?(?:form|changes|settings|profile))"#,
        build: |_| Intent::Save,
    },
    IntentRule {
        name: "nav-click",
        pattern: r#"(?i)^\s*(?:click|tap|press|select)\s+(?:on\s+)?(?:the\s+)?['"]([^'"]+)['"]\s+(?:link|tab|nav(?:igation)?\s+(?:link|item)|menu\s+item|(?:in|on|from)\s+the\s+(?:nav|navigation|navbar|sidebar|menu|header))\b"#,
        build: |caps| Intent::NavClick { target: group(caps, 1) },
    },
    IntentRule {
        name: "modal-trigger",
        pattern: r#"(?i)^\s*(?:click|press|tap)\s+(?:on\s+)?(?:the\s+)?['"]?[^'"]*\b(?:delete|remove|archive|new|open|edit)\b"#,
        build: |_| Intent::ModalTrigger,
    },
    IntentRule {
        name: "click",
        pattern: r"(?i)^\s*(?:click|tap|press)\b",
        build: |_| Intent::Click,
    },
];

/// The intent table, in priority order
pub fn intent_rules() -> &'static [IntentRule] {
    RULES
}

fn compiled() -> &'static [(Regex, &'static IntentRule)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static IntentRule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|rule| Regex::new(rule.pattern).ok().map(|re| (re, rule)))
            .collect()
    })
}

/// Detect the intent of an Act instruction
pub fn detect_intent(instruction: &str) -> Intent {
    compiled()
        .iter()
        .find_map(|(re, rule)| re.captures(instruction).map(|caps| (rule.build)(&caps)))
        .unwrap_or(Intent::Other)
}

/// Name of the table row matching an instruction, for logging
pub fn intent_name(instruction: &str) -> &'static str {
    compiled()
        .iter()
        .find(|(re, _)| re.is_match(instruction))
        .map(|(_, rule)| rule.name)
        .unwrap_or("other")
}

/// The thing a click-style instruction points at
///
/// Only click-style verbs have a target. Prefers a quoted phrase; otherwise
/// the words after the verb, without a leading article or a trailing
/// control noun.
pub fn click_target(instruction: &str) -> Option<String> {
    static PATTERNS: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    let (verb, quoted, bare) = PATTERNS.get_or_init(|| {
        (
            Regex::new(r"(?i)^\s*(?:click|tap|press|select|choose|check)\b").expect("valid verb pattern"),
            Regex::new(r#"['"“]([^'"“”]+)['"”]"#).expect("valid quoted target pattern"),
            Regex::new(
                r"(?i)^\s*(?:click|tap|press|select|choose|check)\s+(?:on\s+)?(?:the\s+)?(.+?)(?:\s+(?:button|link|tab|option|checkbox|radio|icon|item))?\s*\.?\s*$",
            )
            .expect("valid bare target pattern"),
        )
    });

    if !verb.is_match(instruction) {
        return None;
    }
    if let Some(caps) = quoted.captures(instruction) {
        let target = caps[1].trim();
        if !target.is_empty() {
            return Some(target.to_string());
        }
    }
    bare.captures(instruction)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// A selection a free-form instruction seems to ask for, as `(field, value)`
///
/// Covers wordings the `select-*` rows miss, such as "Pick Medium for
/// priority". The field is empty when the instruction does not name one.
pub fn option_choice(instruction: &str) -> Option<(String, String)> {
    static PATTERNS: OnceLock<(Regex, Regex, Regex, Regex, Regex)> = OnceLock::new();
    let (choice, quoted, field, bare, trailing) = PATTERNS.get_or_init(|| {
        (
            Regex::new(
                r"(?i)(?:^\s*(?:pick|choose|select|set|change|use|switch)\b|\b(?:dropdown|option|select|picker|combo\s*box)\b)",
            )
            .expect("valid choice pattern"),
            Regex::new(r#"['"“]([^'"“”]+)['"”]"#).expect("valid quoted value pattern"),
            Regex::new(r"(?i)\b(?:for|in|from|on)\s+(?:the\s+)?([\w-]+)").expect("valid field pattern"),
            Regex::new(r"(?i)^\s*(?:pick|choose|select|use)\s+(?:the\s+)?(.+?)\s+(?:for|as|in|from)\s+(?:the\s+)?([\w-]+)")
                .expect("valid bare choice pattern"),
            Regex::new(r"(?i)^\s*(?:set|change|switch)\s+(?:the\s+)?([\w-]+).*?\bto\s+([\w-]+)\s*\.?\s*$")
                .expect("valid trailing choice pattern"),
        )
    });

    if !choice.is_match(instruction) {
        return None;
    }
    if let Some(caps) = quoted.captures(instruction) {
        let value = caps[1].trim().to_string();
        let rest = instruction.replacen(&caps[0], " ", 1);
        let field = field
            .captures(&rest)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        return (!value.is_empty()).then_some((field, value));
    }
    if let Some(caps) = bare.captures(instruction) {
        return Some((caps[2].to_string(), caps[1].trim().to_string()));
    }
    trailing
        .captures(instruction)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}
