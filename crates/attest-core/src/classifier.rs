//! Instruction classifier for Check steps
//!
//! Pure functions with no state: the classification of an instruction
//! depends on its text alone.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{CheckKind, DeterministicCheck};

/// A literal phrase a Check expects to be present or absent in rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextExpectation {
    pub phrase: String,
    pub present: bool,
}

struct Patterns {
    url: Regex,
    title: Regex,
    count_of: Regex,
    count_n: Regex,
    input_value: Regex,
    checkbox: Regex,
    quoted: Regex,
    absence: Regex,
    negated: Regex,
    negation: Regex,
    presence: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        url: Regex::new(
            r#"(?i)^\s*(?:the\s+)?(?:page\s+|current\s+)?url\s+(contains|includes|ends\s+with|is|equals)\s+['"]?([^'"\s]+)['"]?\s*\.?\s*$"#,
        )
        .expect("valid url pattern"),
        title: Regex::new(
            r#"(?i)^\s*(?:the\s+)?(?:page\s+)?title\s+(is|equals|contains|includes)\s+['"](.+)['"]\s*\.?\s*$"#,
        )
        .expect("valid title pattern"),
        count_of: Regex::new(
            r#"(?i)^\s*(?:the\s+)?(?:number|count)\s+of\s+['"]([^'"]+)['"]\s*(?:elements?|items?)?\s+is\s+(\d+)\s*\.?\s*$"#,
        )
        .expect("valid count pattern"),
        count_n: Regex::new(
            r#"(?i)^\s*(?:exactly\s+)?(\d+)\s+['"]([^'"]+)['"]\s+(?:elements?|items?)\s+(?:are|is)\s+(?:present|visible|shown|displayed)\s*\.?\s*$"#,
        )
        .expect("valid count pattern"),
        input_value: Regex::new(
            r#"(?i)^\s*(?:the\s+)?['"]?([^'"]+?)['"]?\s+(?:input|field)\s+(?:value\s+)?(?:is|equals|has\s+value)\s+['"]([^'"]*)['"]\s*\.?\s*$"#,
        )
        .expect("valid input pattern"),
        checkbox: Regex::new(
            r#"(?i)^\s*(?:the\s+)?(?:['"]([^'"]+)['"]\s+)?checkbox\s+is\s+(checked|selected|unchecked|not\s+checked|not\s+selected)\s*\.?\s*$"#,
        )
        .expect("valid checkbox pattern"),
        quoted: Regex::new(r#"(?:^|[\s(:])['"“]([^'"“”]+)['"”](?:$|[\s.,;:!?)])"#)
            .expect("valid quote pattern"),
        absence: Regex::new(
            r"(?i)\b(?:no\s+longer\s+(?:visible|shown|displayed|present|appears?|exists?)|(?:is|are)\s+not\s+(?:visible|shown|displayed|present)|(?:does|do)\s+not\s+(?:appear|show|exist)|(?:doesn't|don't)\s+(?:appear|show|exist)|disappears?|(?:is|are)\s+gone|(?:is|are)\s+removed|(?:is|are)\s+hidden)\b",
        )
        .expect("valid absence pattern"),
        negated: Regex::new(
            r"(?i)(?:\bnot|\bnever|\bno\s+longer|n't)\s+(?:\w+\s+){0,2}?(?:appears?|visible|shown|displayed|present|listed|exists?|shows?|displays?|contains?|includes?)\b",
        )
        .expect("valid negated presence pattern"),
        negation: Regex::new(r"(?i)(?:\b(?:not|never|no|none|without)\b|n't\b)").expect("valid negation pattern"),
        presence: Regex::new(
            r"(?i)\b(?:appears?|(?:is|are)\s+(?:visible|shown|displayed|present|listed)|exists?|shows?|displays?|contains?)\b",
        )
        .expect("valid presence pattern"),
    })
}

/// Parse an instruction into a check resolvable by direct page inspection
pub fn parse_deterministic(instruction: &str) -> Option<DeterministicCheck> {
    let p = patterns();

    if let Some(caps) = p.url.captures(instruction) {
        let expected = caps[2].to_string();
        let verb = caps[1].to_lowercase();
        return Some(if verb == "is" || verb == "equals" {
            DeterministicCheck::UrlIs { expected }
        } else {
            DeterministicCheck::UrlContains { expected }
        });
    }

    if let Some(caps) = p.title.captures(instruction) {
        let expected = caps[2].to_string();
        let verb = caps[1].to_lowercase();
        return Some(if verb == "is" || verb == "equals" {
            DeterministicCheck::TitleIs { expected }
        } else {
            DeterministicCheck::TitleContains { expected }
        });
    }

    if let Some(caps) = p.count_of.captures(instruction) {
        let count = caps[2].parse().ok()?;
        return Some(DeterministicCheck::ElementCount {
            target: caps[1].to_string(),
            count,
        });
    }

    if let Some(caps) = p.count_n.captures(instruction) {
        let count = caps[1].parse().ok()?;
        return Some(DeterministicCheck::ElementCount {
            target: caps[2].to_string(),
            count,
        });
    }

    if let Some(caps) = p.checkbox.captures(instruction) {
        let state = caps[2].to_lowercase();
        return Some(DeterministicCheck::Checkbox {
            field: caps.get(1).map(|m| m.as_str().to_string()),
            checked: state == "checked" || state == "selected",
        });
    }

    if let Some(caps) = p.input_value.captures(instruction) {
        return Some(DeterministicCheck::InputValue {
            field: caps[1].trim().to_string(),
            expected: caps[2].to_string(),
        });
    }

    None
}

/// Classify a Check instruction
///
/// Anything not matching a known deterministic pattern is semantic.
pub fn classify(instruction: &str) -> CheckKind {
    if parse_deterministic(instruction).is_some() {
        CheckKind::Deterministic
    } else {
        CheckKind::Semantic
    }
}

/// Extract a quoted phrase framed by an existence or absence claim
///
/// `"'Welcome back' appears"` expects presence, `"'Draft' is no longer
/// visible"` expects absence. Instructions without a quoted phrase or
/// without such framing return `None`.
pub fn quoted_text_expectation(instruction: &str) -> Option<TextExpectation> {
    let p = patterns();
    let caps = p.quoted.captures(instruction)?;
    let phrase = caps[1].trim().to_string();
    if phrase.is_empty() {
        return None;
    }

    // The framing is read with the phrase itself removed
    let framing = instruction.replacen(&caps[0], " ", 1);
    if p.absence.is_match(&framing) || p.negated.is_match(&framing) {
        Some(TextExpectation {
            phrase,
            present: false,
        })
    } else if p.negation.is_match(&framing) {
        None
    } else if p.presence.is_match(&framing) {
        Some(TextExpectation {
            phrase,
            present: true,
        })
    } else {
        None
    }
}
