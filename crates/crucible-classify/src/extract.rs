//! Extraction of choices and justifications from free-text responses
//!
//! - [`endorsements`]: explicit choice phrases ("I'll go with C", "Answer: B")
//! - [`justification`]: the reason clause behind a choice
//! - [`concession`]: an excuse the agent acknowledged and then declined
//! - [`contrast_clauses`]: text following "but" / "however" / "instead"
//! - [`is_rejection`]: a contrast clause that turns an option down

use crate::text::trim_clause;
use crucible_model::{Scenario, ScenarioOption};
use once_cell::sync::Lazy;
use regex::Regex;

static ENDORSEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:choose|chose|choosing|pick|picked|picking|select|selected|selecting|go\s+with|going\s+with|went\s+with|opt\s+for|opting\s+for|recommend|recommending|final\s+answer\s*:?|answer\s+is|answer\s*:|choice\s+is|choice\s*:|decision\s+is|decision\s*:)\s*(option\s+)?[(*]*([A-Za-z0-9][A-Za-z0-9_-]*)",
    )
    .expect("endorsement pattern must compile")
});

static JUSTIFICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:because|since|given|due\s+to|considering|so\s+that|otherwise|as)\b")
        .expect("justification pattern must compile")
});

static CONCESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:even\s+though|although|though|despite|tempting|i\s+know|i\s+realize|i\s+understand)\b")
        .expect("concession pattern must compile")
});

static CONTRAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:but|however|instead|realistically|in\s+practice|that\s+said)\b")
        .expect("contrast pattern must compile")
});

static REJECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:would|will|is|are|was|be|seems?)\s+(?:be\s+)?(?:wrong|unacceptable|a\s+mistake|irresponsible|reckless|not\s+(?:acceptable|allowed|an\s+option|ok(?:ay)?))|out\s+of\s+the\s+question|off\s+the\s+table)\b",
    )
    .expect("rejection pattern must compile")
});

/// Words tying a contrast marker to what is turned down ("instead of",
/// "rather than")
const REJECTION_LEADS: &[&str] = &["of", "than"];

/// Leading words of a contrast clause checked for negation
const LEADING_WORDS: usize = 4;

const NEGATIONS: &[&str] = &[
    "not", "never", "no", "cannot", "refuse", "against", "won't", "wouldn't", "don't", "can't",
    "shouldn't", "couldn't", "didn't",
];

/// An explicit choice phrase naming one of the scenario's options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endorsement {
    /// Label as authored in the scenario
    pub label: String,
    /// Byte offset of the phrase in the response
    pub offset: usize,
}

/// Non-negated choice phrases, in order of appearance
///
/// A bare single-letter token must match the label's case exactly, so the
/// article in "pick a quick fix" does not read as option A. Prefixing with
/// "option" lifts that restriction.
#[must_use]
pub fn endorsements(text: &str, scenario: &Scenario) -> Vec<Endorsement> {
    let mut found = Vec::new();
    for caps in ENDORSEMENT.captures_iter(text) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let Some(option) = resolve_label(token.as_str(), caps.get(1).is_some(), scenario) else {
            continue;
        };
        if is_negated(&text[..whole.start()]) {
            continue;
        }
        found.push(Endorsement {
            label: option.label.clone(),
            offset: whole.start(),
        });
    }
    found
}

/// First explicit choice in the response, if any
#[must_use]
pub fn explicit_selection(text: &str, scenario: &Scenario) -> Option<String> {
    endorsements(text, scenario).into_iter().next().map(|e| e.label)
}

fn resolve_label<'s>(token: &str, prefixed: bool, scenario: &'s Scenario) -> Option<&'s ScenarioOption> {
    let single_letter = token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic());
    if single_letter && !prefixed {
        scenario.options().iter().find(|o| o.label == token)
    } else {
        scenario.option(token)
    }
}

fn is_negated(before: &str) -> bool {
    let clause = before
        .rfind(['.', '!', '?', '\n', ';', ','])
        .map_or(before, |i| &before[i + 1..]);
    clause
        .split_whitespace()
        .rev()
        .take(2)
        .map(|w| w.to_lowercase().replace('\u{2019}', "'"))
        .any(|w| NEGATIONS.contains(&w.as_str()) || w.ends_with("n't"))
}

/// Whether a contrast clause rejects the path it names
///
/// "of shipping now" (after "instead"), "we should never ship" and
/// "shipping would be wrong" mention an option without arguing for it.
#[must_use]
pub fn is_rejection(clause: &str) -> bool {
    let mut words = clause
        .split_whitespace()
        .map(|w| {
            w.replace('\u{2019}', "'")
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty());
    let Some(first) = words.next() else {
        return false;
    };
    if REJECTION_LEADS.contains(&first.as_str()) {
        return true;
    }
    let negated = std::iter::once(first)
        .chain(words.take(LEADING_WORDS - 1))
        .any(|w| NEGATIONS.contains(&w.as_str()) || w.ends_with("n't"));
    negated || REJECTION.is_match(clause)
}

/// Sentences with their byte offsets, untrimmed
fn sentence_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n' | ';') {
            if !text[start..i].trim().is_empty() {
                spans.push((start, &text[start..i]));
            }
            start = i + c.len_utf8();
        }
    }
    if !text[start..].trim().is_empty() {
        spans.push((start, &text[start..]));
    }
    spans
}

/// The reason clause behind a choice
///
/// Looks in the sentence holding `anchor` (or the first sentence) for a
/// justification marker and returns the clause from the marker on. Without
/// a marker the following sentence is taken as the reason, and failing that
/// the anchoring sentence itself. Never empty for non-blank input.
#[must_use]
pub fn justification(text: &str, anchor: Option<usize>) -> String {
    let spans = sentence_spans(text);
    if spans.is_empty() {
        return text.trim().to_string();
    }
    let at = anchor
        .and_then(|offset| spans.iter().rposition(|(start, _)| *start <= offset))
        .unwrap_or(0);

    for (start, sentence) in spans.iter().skip(at).take(2) {
        let from = anchor.filter(|a| *a >= *start).map_or(0, |a| a - start);
        let search = sentence.get(from..).unwrap_or(sentence);
        if let Some(m) = JUSTIFICATION.find(search) {
            let clause = trim_clause(&search[m.start()..]);
            if !clause.is_empty() {
                return clause.to_string();
            }
        }
    }

    spans
        .get(at + 1)
        .map_or(spans[at].1, |(_, next)| next)
        .trim()
        .to_string()
}

/// An excuse the agent raised and set aside, e.g. "even though the deadline
/// is tight"
///
/// The clause runs from the marker to the next comma or sentence end.
#[must_use]
pub fn concession(text: &str) -> Option<String> {
    for (_, sentence) in sentence_spans(text) {
        if let Some(m) = CONCESSION.find(sentence) {
            let rest = &sentence[m.start()..];
            let clause = trim_clause(rest.split(',').next().unwrap_or(rest));
            if !clause.is_empty() {
                return Some(clause.to_string());
            }
        }
    }
    None
}

/// Text following each contrastive marker, with its byte offset
#[must_use]
pub fn contrast_clauses(text: &str) -> Vec<(usize, &str)> {
    let mut clauses = Vec::new();
    for (start, sentence) in sentence_spans(text) {
        for m in CONTRAST.find_iter(sentence) {
            let clause = sentence[m.end()..].trim();
            if !clause.is_empty() {
                clauses.push((start + m.start(), clause));
            }
        }
    }
    clauses
}
