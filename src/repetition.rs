//! Repetition detector for outbound candidates.
//!
//! Goal: stop the engine from sending near-duplicate messages when the
//! oracle gets stuck in a loop.
//!
//! Simple API, no external crates:
//! - Call `check(candidate, recent)` with the recent outbound history,
//!   most recent first. Only the last [`WINDOW`] messages are considered.
//! - Three rules, first match wins and returns a human-readable reason:
//!   exact match, Jaccard word-set similarity above [`JACCARD_THRESHOLD`],
//!   and a recurring ~[`OPENER_LEN`]-char opening (flags formulaic openers
//!   even when the bodies differ).

use std::collections::HashSet;

/// How many recent outbound messages to compare against.
pub const WINDOW: usize = 5;
/// Word-set similarity strictly above this is a near-duplicate.
pub const JACCARD_THRESHOLD: f64 = 0.7;
/// Opening prefix length for the formulaic-opener rule.
pub const OPENER_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct RepetitionVerdict {
    pub repetitive: bool,
    pub reason: Option<String>,
}

impl RepetitionVerdict {
    fn clean() -> Self {
        Self {
            repetitive: false,
            reason: None,
        }
    }

    fn flagged(reason: String) -> Self {
        Self {
            repetitive: true,
            reason: Some(reason),
        }
    }
}

/// Check `candidate` against recent outbound history (most recent first).
pub fn check(candidate: &str, recent: &[&str]) -> RepetitionVerdict {
    let window: Vec<&str> = recent.iter().take(WINDOW).copied().collect();
    if window.is_empty() {
        return RepetitionVerdict::clean();
    }

    let cand_trim = candidate.trim();

    // Rule 1: exact repeat.
    if let Some(pos) = window.iter().position(|m| m.trim() == cand_trim) {
        return RepetitionVerdict::flagged(format!(
            "identical to message sent {} back",
            ordinal(pos + 1)
        ));
    }

    // Rule 2: near-duplicate by word-set overlap.
    let cand_words = word_set(candidate);
    for (pos, m) in window.iter().enumerate() {
        let sim = jaccard(&cand_words, &word_set(m));
        if sim > JACCARD_THRESHOLD {
            return RepetitionVerdict::flagged(format!(
                "{:.0}% word overlap with message sent {} back",
                sim * 100.0,
                ordinal(pos + 1)
            ));
        }
    }

    // Rule 3: formulaic opener recurring across the window.
    let cand_opener = opener(candidate);
    if !cand_opener.is_empty() {
        let repeats = window.iter().filter(|m| opener(m) == cand_opener).count();
        if repeats >= 2 {
            return RepetitionVerdict::flagged(format!(
                "same opening used {repeats} times in the last {} messages",
                window.len()
            ));
        }
    }

    RepetitionVerdict::clean()
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

fn opener(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .take(OPENER_LEN)
        .collect()
}

fn ordinal(n: usize) -> String {
    match n {
        1 => "1 message".to_string(),
        n => format!("{n} messages"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_repeat_is_flagged() {
        let v = check("Hi Ada, ready to book a call?", &["Hi Ada, ready to book a call?"]);
        assert!(v.repetitive);
        assert!(v.reason.unwrap().contains("identical"));
    }

    #[test]
    fn same_message_twice_in_a_row() {
        // Idempotence: the second occurrence of any message must be flagged.
        let msg = "Quick update on your mortgage options.";
        assert!(!check(msg, &[]).repetitive);
        assert!(check(msg, &[msg]).repetitive);
    }

    #[test]
    fn high_word_overlap_is_flagged() {
        let v = check(
            "Hi Ada, just wondering if you had time to look at the rates",
            &["Hi Ada just wondering if you had time to look at rates"],
        );
        assert!(v.repetitive);
        assert!(v.reason.unwrap().contains("overlap"));
    }

    #[test]
    fn recurring_opener_is_flagged_even_with_different_bodies() {
        let recent = [
            "Hope you're doing well! Just wanted to check in on the updated rates from the lender.",
            "Hope you're doing well! Just wanted to check in on your document upload.",
            "Completely different text about something else entirely and much longer too.",
        ];
        let v = check(
            "Hope you're doing well! Just wanted to check in on whether Thursday still works for a quick chat.",
            &recent,
        );
        assert!(v.repetitive);
        assert!(v.reason.unwrap().contains("opening"));
    }

    #[test]
    fn distinct_messages_pass() {
        let recent = [
            "Your appointment with Greg is confirmed for Thursday.",
            "The lender came back with an updated rate today.",
        ];
        let v = check("Would mornings or afternoons suit you better for a call?", &recent);
        assert!(!v.repetitive);
    }

    #[test]
    fn only_last_five_are_considered() {
        let msg = "An old message far back in the history.";
        let recent = [
            "one recent message here",
            "two recent message here no wait different words entirely",
            "third text about rates",
            "fourth text about documents",
            "fifth text about valuations",
            msg, // sixth: outside the window
        ];
        assert!(!check(msg, &recent).repetitive);
    }
}
