//! Lexical answer scoring.
//!
//! Scoring is deliberately approximate: an answer is judged by how many
//! key terms of the expected answer appear in it as lowercase substrings.
//! Key terms come from hand-written rules keyed on phrases in the expected
//! answer; when no rule fires, they are the expected answer's
//! whitespace-separated words longer than three characters, minus
//! [`STOP_WORDS`].
//!
//! Thresholds and rules are fixed so runs stay comparable over time.

use super::Difficulty;

/// Words dropped by the fallback term extraction.
pub const STOP_WORDS: &[&str] = &["that", "with", "from", "this"];

/// Minimum word length (exclusive) kept by the fallback extraction.
const MIN_FALLBACK_LEN: usize = 3;

enum Trigger {
    Any(&'static [&'static str]),
    All(&'static [&'static str]),
}

impl Trigger {
    fn fires(&self, expected: &str) -> bool {
        match self {
            Trigger::Any(phrases) => phrases.iter().any(|p| expected.contains(p)),
            Trigger::All(phrases) => phrases.iter().all(|p| expected.contains(p)),
        }
    }
}

struct TermRule {
    trigger: Trigger,
    terms: &'static [&'static str],
}

/// Domain rules, evaluated in order. Every rule that fires contributes its
/// terms; duplicates are kept and each counts separately.
const RULES: &[TermRule] = &[
    TermRule {
        trigger: Trigger::Any(&["3 retry", "3-second"]),
        terms: &["3", "retry", "second"],
    },
    TermRule {
        trigger: Trigger::Any(&["new-orders"]),
        terms: &["new-orders"],
    },
    TermRule {
        trigger: Trigger::Any(&["payment_halt", "kafka listener stops"]),
        terms: &["payment", "halt", "listener", "stop"],
    },
    TermRule {
        trigger: Trigger::All(&["h2", "file"]),
        terms: &["h2", "file", "local"],
    },
    TermRule {
        trigger: Trigger::Any(&["pod restart"]),
        terms: &["pod", "restart"],
    },
    TermRule {
        trigger: Trigger::All(&["permanent", "loss"]),
        terms: &["permanent", "loss"],
    },
    TermRule {
        trigger: Trigger::Any(&["legacypaymentfallback"]),
        terms: &["legacy", "payment", "fallback"],
    },
    TermRule {
        trigger: Trigger::Any(&["test coverage"]),
        terms: &["test", "coverage"],
    },
    TermRule {
        trigger: Trigger::Any(&["deprecated"]),
        terms: &["deprecated"],
    },
    TermRule {
        trigger: Trigger::Any(&["hardcoded"]),
        terms: &["hardcoded", "redis"],
    },
    TermRule {
        trigger: Trigger::Any(&["java 17"]),
        terms: &["java", "17"],
    },
    TermRule {
        trigger: Trigger::Any(&["spring boot"]),
        terms: &["spring", "boot"],
    },
];

/// Derive the key terms an answer must contain.
pub fn extract_key_terms(expected_answer: &str) -> Vec<String> {
    let expected = expected_answer.to_lowercase();

    let terms: Vec<String> = RULES
        .iter()
        .filter(|rule| rule.trigger.fires(&expected))
        .flat_map(|rule| rule.terms.iter().map(|t| t.to_string()))
        .collect();
    if !terms.is_empty() {
        return terms;
    }

    expected
        .split_whitespace()
        .filter(|w| w.chars().count() > MIN_FALLBACK_LEN && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Outcome of scoring one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub matches: usize,
    pub total_terms: usize,
    /// `matches / total_terms`, or `0.0` when there are no terms.
    pub confidence: f64,
    pub is_correct: bool,
}

impl Score {
    pub fn notes(&self) -> String {
        format!(
            "Key terms found: {}/{} (confidence: {:.2})",
            self.matches, self.total_terms, self.confidence
        )
    }
}

/// Score `actual` against `expected` for a case of the given difficulty.
pub fn score_answer(expected: &str, actual: &str, difficulty: Difficulty) -> Score {
    let key_terms = extract_key_terms(expected);
    let actual = actual.to_lowercase();

    let matches = key_terms
        .iter()
        .filter(|term| actual.contains(term.as_str()))
        .count();
    let confidence = if key_terms.is_empty() {
        0.0
    } else {
        matches as f64 / key_terms.len() as f64
    };

    Score {
        matches,
        total_terms: key_terms.len(),
        confidence,
        is_correct: confidence >= difficulty.threshold(),
    }
}
