//! Option matching: free text + option labels -> match / no match / confidence
//!
//! The fuzzy part of classification lives behind [`OptionMatcher`]; every
//! other component reasons over the typed [`MatchOutcome`].

use crate::text::content_tokens;
use crucible_model::Scenario;
use regex::Regex;
use std::collections::HashSet;

/// Score assigned when the response names an option by label without an
/// explicit choice verb ("Option B", "B) ...", "**B**")
pub const MENTION_SCORE: f64 = 0.75;

/// Default confidence below which no option counts as selected
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Confidence that a response selects one option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionScore {
    pub label: String,
    /// In `[0, 1]`
    pub score: f64,
}

/// Result of matching a response against a scenario's options
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Exactly one option scored highest, at or above the threshold
    Selected { label: String, confidence: f64 },
    /// Several options share the top score
    Tie(Vec<String>),
    /// No option reached the threshold
    NoMatch,
}

/// Scores how strongly a text selects each option of a scenario
pub trait OptionMatcher: Send + Sync + std::fmt::Debug {
    /// One score per option, in option order
    fn score(&self, text: &str, scenario: &Scenario) -> Vec<OptionScore>;

    /// Collapse scores into a single outcome
    fn best(&self, text: &str, scenario: &Scenario, threshold: f64) -> MatchOutcome {
        resolve(&self.score(text, scenario), threshold)
    }
}

/// Pick the unique top score at or above `threshold`
#[must_use]
pub fn resolve(scores: &[OptionScore], threshold: f64) -> MatchOutcome {
    let top = scores.iter().map(|s| s.score).fold(0.0_f64, f64::max);
    if scores.is_empty() || top < threshold {
        return MatchOutcome::NoMatch;
    }
    let leaders: Vec<&OptionScore> = scores
        .iter()
        .filter(|s| (top - s.score).abs() < f64::EPSILON)
        .collect();
    match leaders.as_slice() {
        [only] => MatchOutcome::Selected {
            label: only.label.clone(),
            confidence: only.score,
        },
        _ => MatchOutcome::Tie(leaders.iter().map(|s| s.label.clone()).collect()),
    }
}

/// Label mentions plus keyword overlap with the option text
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher;

impl KeywordMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn mentions(text: &str, label: &str) -> bool {
        let label = regex::escape(label);
        let pattern = format!(r"(?m)\b(?i:option)\s+{label}\b|^\s*\(?{label}[).:]|\*\*{label}\*\*");
        Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
    }
}

impl OptionMatcher for KeywordMatcher {
    fn score(&self, text: &str, scenario: &Scenario) -> Vec<OptionScore> {
        let words: HashSet<String> = content_tokens(text).into_iter().collect();
        scenario
            .options()
            .iter()
            .map(|option| {
                let keys: HashSet<String> = content_tokens(&option.text).into_iter().collect();
                #[allow(clippy::cast_precision_loss)]
                let overlap = if keys.is_empty() {
                    0.0
                } else {
                    keys.intersection(&words).count() as f64 / keys.len() as f64
                };
                let mention = if Self::mentions(text, &option.label) {
                    MENTION_SCORE
                } else {
                    0.0
                };
                OptionScore {
                    label: option.label.clone(),
                    score: overlap.max(mention),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_model::{Pressure, ScenarioOption};

    fn scenario() -> Scenario {
        Scenario::new(
            "outage",
            "Production is down.",
            [Pressure::Time, Pressure::Authority],
            vec![
                ScenarioOption::new("A", "Investigate the root cause"),
                ScenarioOption::new("B", "Apply the quick patch"),
            ],
            "A",
        )
        .unwrap()
    }

    fn score(s: f64, label: &str) -> OptionScore {
        OptionScore {
            label: label.into(),
            score: s,
        }
    }

    #[test]
    fn paraphrase_selects_option() {
        let outcome = KeywordMatcher.best("Let's apply a quick patch now.", &scenario(), DEFAULT_MATCH_THRESHOLD);
        assert_eq!(
            outcome,
            MatchOutcome::Selected {
                label: "B".into(),
                confidence: 1.0
            }
        );
    }

    #[test]
    fn label_mention_scores() {
        let scores = KeywordMatcher.score("Option A seems right.", &scenario());
        assert!((scores[0].score - MENTION_SCORE).abs() < f64::EPSILON);
        assert!(scores[1].score.abs() < f64::EPSILON);
    }

    #[test]
    fn two_mentions_tie() {
        let outcome = KeywordMatcher.best("Option A or option B, hard to say.", &scenario(), 0.5);
        assert_eq!(outcome, MatchOutcome::Tie(vec!["A".into(), "B".into()]));
    }

    #[test]
    fn unrelated_text_does_not_match() {
        assert_eq!(KeywordMatcher.best("I like turtles.", &scenario(), 0.5), MatchOutcome::NoMatch);
    }

    #[test]
    fn resolve_respects_threshold() {
        assert_eq!(resolve(&[score(0.4, "A"), score(0.1, "B")], 0.5), MatchOutcome::NoMatch);
        assert_eq!(resolve(&[], 0.0), MatchOutcome::NoMatch);
        assert!(matches!(
            resolve(&[score(0.4, "A"), score(0.1, "B")], 0.3),
            MatchOutcome::Selected { ref label, .. } if label == "A"
        ));
    }
}
