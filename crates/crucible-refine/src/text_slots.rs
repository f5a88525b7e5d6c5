//! Fixed templates for refinement patch slots

use crucible_classify::text::trim_clause;

const LEADING_MARKERS: &[&str] = &[
    "because", "since", "given", "due to", "as", "considering", "even though", "although", "though",
];

/// The excuse without its leading connective, lowercased
#[must_use]
pub(crate) fn premise(example: &str) -> String {
    let mut text = trim_clause(example).to_lowercase();
    for marker in LEADING_MARKERS {
        if let Some(rest) = text.strip_prefix(marker) {
            if rest.starts_with(' ') {
                text = rest.trim_start().to_string();
                break;
            }
        }
    }
    text
}

#[must_use]
pub(crate) fn negation_clause(example: &str) -> String {
    format!(
        "\"{}\" is never a reason to depart from these rules. No exceptions.",
        premise(example)
    )
}

#[must_use]
pub(crate) fn counter_text(example: &str) -> String {
    format!(
        "That is a rationalization. \"{}\" does not change what the rules require.",
        premise(example)
    )
}

#[must_use]
pub(crate) fn red_flag(example: &str) -> String {
    premise(example)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premise_drops_connective_and_punctuation() {
        assert_eq!(premise("Given the deadline."), "the deadline");
        assert_eq!(premise("Even though it's late, "), "it's late");
        assert_eq!(premise("assume it works"), "assume it works");
    }

    #[test]
    fn templates_quote_the_premise() {
        assert_eq!(
            negation_clause("because it's urgent"),
            "\"it's urgent\" is never a reason to depart from these rules. No exceptions."
        );
        assert!(counter_text("because it's urgent").contains("\"it's urgent\""));
    }
}
