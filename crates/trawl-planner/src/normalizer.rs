//! Request interpretation, kept behind one narrow trait so the router never
//! sees raw text.

use regex::Regex;
use std::sync::LazyLock;
use trawl_core::InteractionKind;

use crate::goal::{Goal, Interaction};

/// Maps a free-form request to initial goal parameters.
pub trait RequestNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> Goal;
}

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).expect("url pattern"));

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|'([^']+)'|“([^”]+)”"#).expect("quoted pattern")
});

static FIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:find|locate|extract|identify|capture)\s+").expect("find pattern")
});

/// Where a "find ..." clause stops.
static CLAUSE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:on|from|at|in|then)\s+|https?://|[;!?]|\.(?:\s|$)|,?\s+(?:and\s+)?(?:click|fill|type|enter|select|press|hover)\b",
    )
    .expect("clause end pattern")
});

static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+").expect("list split pattern"));

static CLICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(click|hover(?:\s+over)?)\s+(?:on\s+)?").expect("click pattern")
});

/// `fill 'v' into X`, `type "v" in X`, `select 'v' from X`, `press 'Enter' in X`.
static VALUE_INTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(fill|type|enter|select|press)\s+(?:"([^"]*)"|'([^']*)')\s+(?:in|into|on|from)\s+"#,
    )
    .expect("value-into pattern")
});

/// `fill [in] X with 'v'`.
static FILL_WITH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfill\s+(?:in\s+)?(.+?)\s+with\s+(?:"([^"]*)"|'([^']*)')"#)
        .expect("fill-with pattern")
});

/// Where an interaction's element phrase stops.
static TARGET_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:and\s+)?then\b|\s+and\s+|\s+(?:on|at)\s+https?://|https?://|[,;!?]|\.(?:\s|$)")
        .expect("target end pattern")
});

static FOLLOW_UP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*,?\s*(?:and\s+)?then\b").expect("follow-up pattern"));

/// Deterministic, rule-based request normalizer.
#[derive(Debug, Default, Clone)]
pub struct RuleNormalizer;

impl RuleNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl RequestNormalizer for RuleNormalizer {
    fn normalize(&self, raw: &str) -> Goal {
        let target_url = first_url(raw);
        let interaction = interaction(raw);

        let mut elements: Vec<String> = Vec::new();
        let mut add = |name: Option<String>| {
            if let Some(name) = name
                && !elements.contains(&name)
            {
                elements.push(name);
            }
        };

        for caps in QUOTED_RE.captures_iter(raw) {
            let Some(quoted) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
                continue;
            };
            let is_value = interaction
                .as_ref()
                .and_then(|i| i.value.as_deref())
                .is_some_and(|v| v == quoted.as_str());
            if !is_value {
                add(clean_name(quoted.as_str()));
            }
        }

        for m in FIND_RE.find_iter(raw) {
            let rest = &raw[m.end()..];
            let clause = match CLAUSE_END_RE.find(rest) {
                Some(end) => &rest[..end.start()],
                None => rest,
            };
            for item in LIST_SPLIT_RE.split(clause) {
                add(clean_name(item));
            }
        }

        if let Some(ref i) = interaction {
            add(Some(i.element.clone()));
        }

        Goal {
            target_url,
            elements,
            interaction,
        }
    }
}

/// First http(s) URL in the text, without trailing sentence punctuation.
fn first_url(raw: &str) -> Option<String> {
    URL_RE.find_iter(raw).find_map(|m| {
        let candidate = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        url::Url::parse(candidate).ok().map(|_| candidate.to_string())
    })
}

fn interaction(raw: &str) -> Option<Interaction> {
    if let Some(caps) = VALUE_INTO_RE.captures(raw) {
        let whole = caps.get(0)?;
        let kind = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "select" => InteractionKind::Select,
            "press" => InteractionKind::Press,
            _ => InteractionKind::Fill,
        };
        let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
        let (element, rest) = target_phrase(&raw[whole.end()..]);
        return Some(Interaction {
            kind,
            element: element?,
            value: Some(value),
            changes_page: FOLLOW_UP_RE.is_match(rest),
        });
    }

    if let Some(caps) = FILL_WITH_RE.captures(raw) {
        let whole = caps.get(0)?;
        let element = clean_name(caps.get(1)?.as_str())?;
        let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
        return Some(Interaction {
            kind: InteractionKind::Fill,
            element,
            value: Some(value),
            changes_page: FOLLOW_UP_RE.is_match(&raw[whole.end()..]),
        });
    }

    let caps = CLICK_RE.captures(raw)?;
    let whole = caps.get(0)?;
    let kind = if caps.get(1)?.as_str().to_ascii_lowercase().starts_with("hover") {
        InteractionKind::Hover
    } else {
        InteractionKind::Click
    };
    let (element, rest) = target_phrase(&raw[whole.end()..]);
    Some(Interaction {
        kind,
        element: element?,
        value: None,
        changes_page: FOLLOW_UP_RE.is_match(rest),
    })
}

/// Split off the element phrase at the start of `text`; returns it and the remainder.
fn target_phrase(text: &str) -> (Option<String>, &str) {
    match TARGET_END_RE.find(text) {
        Some(end) => (clean_name(&text[..end.start()]), &text[end.start()..]),
        None => (clean_name(text), ""),
    }
}

/// Canonical element name: lowercase, single-spaced, no article or quotes.
fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c: char| {
        c == '"' || c == '\'' || c == '“' || c == '”' || c.is_ascii_punctuation() && c != '_' && c != '#'
    });
    let lowered = trimmed.to_lowercase();
    let mut words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(['"', '\'', '“', '”']))
        .filter(|w| !w.is_empty())
        .collect();
    if matches!(words.first(), Some(&"the") | Some(&"a") | Some(&"an")) {
        words.remove(0);
    }
    if matches!(words.last(), Some(&"element") | Some(&"elements")) && words.len() > 1 {
        words.pop();
    }
    let name = words.join(" ");
    if name.is_empty() { None } else { Some(name) }
}
