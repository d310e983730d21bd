//! sentiment.rs — keyword/phrase classifiers over lead messages.
//!
//! Single seam for every phrase-list heuristic the core relies on: reply
//! tone, objection detection, opt-out/decline/affirmative classification,
//! and the soft-rule vocabularies (stock phrases, high-pressure language).
//! The lists are a deliberately simple baseline; keeping them behind
//! `classify()` and the `is_*` helpers lets a stronger classifier slot in
//! without touching validator or analyzer rule logic.

use serde::{Deserialize, Serialize};

/// Coarse tone of an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tone {
    Enthusiastic,
    Neutral,
    Reluctant,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneVerdict {
    pub tone: Tone,
    pub objection: bool,
}

const ENTHUSIASTIC: &[&str] = &[
    "sounds great",
    "sounds good",
    "perfect",
    "amazing",
    "can't wait",
    "cant wait",
    "yes please",
    "definitely",
    "let's do it",
    "lets do it",
    "excited",
];

const RELUCTANT: &[&str] = &[
    "maybe later",
    "not sure",
    "i'll think about it",
    "ill think about it",
    "need more time",
    "call me some other time",
    "bit hesitant",
];

/// Fixed objection set. Matching any phrase flips the objection flag
/// regardless of tone.
const OBJECTIONS: &[&str] = &[
    "already working with someone",
    "already have a broker",
    "already have an advisor",
    "too busy",
    "not interested",
    "too expensive",
    "can't afford",
    "cant afford",
    "stop contacting",
];

const OPT_OUT: &[&str] = &[
    "stop",
    "unsubscribe",
    "opt out",
    "opt-out",
    "remove me",
    "don't message me",
    "dont message me",
];

const DECLINE: &[&str] = &[
    "not interested",
    "no thanks",
    "no thank you",
    "leave me alone",
    "wrong number",
    "already sorted",
];

const AFFIRMATIVE: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "sure",
    "ok",
    "okay",
    "sounds good",
    "works for me",
    "that works",
];

/// Stock phrases the oracle tends to overuse; soft-flagged, never blocking.
const STOCK_PHRASES: &[&str] = &[
    "just checking in",
    "just following up",
    "touching base",
    "circling back",
    "just wanted to reach out",
];

/// High-pressure / "salesy" vocabulary; soft-flagged.
const SALESY: &[&str] = &[
    "act now",
    "limited time",
    "don't miss out",
    "dont miss out",
    "once in a lifetime",
    "exclusive offer",
    "guaranteed approval",
    "last chance",
];

fn norm(text: &str) -> String {
    text.to_lowercase()
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| haystack.contains(p))
}

fn matched<'a>(haystack: &str, phrases: &'a [&'a str]) -> Vec<&'a str> {
    phrases
        .iter()
        .filter(|p| haystack.contains(*p))
        .copied()
        .collect()
}

fn word_match(haystack: &str, phrase: &str) -> bool {
    if phrase.contains(' ') || phrase.contains('-') {
        haystack.contains(phrase)
    } else {
        haystack
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == phrase)
    }
}

/// Classify the tone of an inbound message. Empty input yields `Unknown`.
pub fn classify(text: &str) -> ToneVerdict {
    let t = norm(text);
    if t.trim().is_empty() {
        return ToneVerdict {
            tone: Tone::Unknown,
            objection: false,
        };
    }
    let objection = contains_any(&t, OBJECTIONS);
    let tone = if contains_any(&t, ENTHUSIASTIC) {
        Tone::Enthusiastic
    } else if contains_any(&t, RELUCTANT) || objection {
        Tone::Reluctant
    } else {
        Tone::Neutral
    };
    ToneVerdict { tone, objection }
}

/// Stop/unsubscribe-type reply. Word-boundary aware for the short tokens
/// ("stop" must not fire inside "unstoppable").
pub fn is_opt_out(text: &str) -> bool {
    let t = norm(text);
    OPT_OUT.iter().any(|p| word_match(&t, p))
}

/// Explicit decline phrases (negative engagement, not an opt-out).
pub fn is_decline(text: &str) -> bool {
    contains_any(&norm(text), DECLINE)
}

/// Affirmative one-liners ("yes", "sounds good", ...).
pub fn is_affirmative(text: &str) -> bool {
    let t = norm(text);
    AFFIRMATIVE.iter().any(|p| word_match(&t, p))
}

/// Stock phrases present in an outbound candidate (soft rule input).
pub fn stock_phrases(text: &str) -> Vec<&'static str> {
    matched(&norm(text), STOCK_PHRASES)
}

/// High-pressure phrases present in an outbound candidate (soft rule input).
pub fn salesy_phrases(text: &str) -> Vec<&'static str> {
    matched(&norm(text), SALESY)
}
