//! Request intent
//!
//! Keyword rules decide whether a request reads, reads and post-processes,
//! or writes. Questions ("how many tenants were added") stay reads even when
//! they contain a write verb.

use fab_tools::catalog::{normalize, similarity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Fetch and enumerate
    Read,
    /// Fetch, then filter/aggregate in the sandbox
    Transform,
    /// POST a payload
    Mutate,
}

static WRITE_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(create|add|update|delete|remove|configure|set|modify|change|rename|enable|disable|attach|detach)\b",
    )
    .expect("write verbs are a valid regex")
});

static QUESTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(how|what|which|who|when|where|why|list|show|get|display|count|is|are|do|does)\b")
        .expect("question start is a valid regex")
});

static TRANSFORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(count|how many|number of|filter|average|avg|mean|sum|total|sort|sorted|top \d+|group|grouped|max|maximum|min|minimum|less than|greater than|more than|fewer than|below|above|at least|at most|table|csv)\b|[<>]=?\s*\d",
    )
    .expect("transform keywords are a valid regex")
});

/// Words that carry no lookup signal
const FILLER: &[&str] = &[
    "a", "all", "an", "any", "are", "can", "current", "display", "every", "fetch", "get", "give",
    "in", "is", "list", "me", "my", "of", "on", "please", "show", "the", "there", "what", "which",
    "you",
];

pub fn classify(message: &str) -> Intent {
    if WRITE_VERB.is_match(message) && !QUESTION_START.is_match(message) {
        Intent::Mutate
    } else if TRANSFORM.is_match(message) {
        Intent::Transform
    } else {
        Intent::Read
    }
}

/// The noun phrase a catalog lookup should match: "show me all bridge
/// domains" -> "bridge domains"
pub fn subject_phrase(message: &str) -> String {
    message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !FILLER.contains(&w.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-word similarity that still counts "tenant" against "tenants"
const WORD_MATCH: f64 = 0.75;

/// Whether a catalog entry name accounts for every word of the subject.
/// "tenant web" names an instance that the "tenants" entry does not cover.
pub fn entry_covers_subject(entry_name: &str, subject: &str) -> bool {
    let entry = normalize(entry_name);
    let words: Vec<&str> = entry.split(' ').collect();
    let subject = normalize(subject);
    !subject.is_empty()
        && subject
            .split(' ')
            .all(|w| words.iter().any(|e| similarity(w, e) >= WORD_MATCH))
}
