//! Text normalization shared by matching and signature keys

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Function words and justification connectives that carry no meaning in a
/// rationalization key
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "been", "before", "being", "both", "but", "by", "can", "could", "did", "do",
    "does", "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has",
    "have", "having", "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out", "over",
    "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "ll", "d", "re",
    "ve", "s", "t", "wo", "ca", "sha", "because", "since", "given", "due", "considering",
    "really", "actually", "basically", "probably", "option", "go", "going", "choose", "pick",
    "think", "feel", "let", "lets", "us", "even", "though", "although", "still", "well",
    "okay", "ok", "yes", "get", "got", "make", "made", "way", "thing", "things",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Whether `word` (already lowercase) is a stopword
#[inline]
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORD_SET.contains(word)
}

/// Lowercase word tokens with contractions split off and punctuation removed
#[must_use]
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .flat_map(|raw| raw.split(['\'', '\u{2019}']))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Content tokens: [`tokens`] minus stopwords
#[must_use]
pub fn content_tokens(text: &str) -> Vec<String> {
    tokens(text).into_iter().filter(|t| !is_stopword(t)).collect()
}

/// Case-folded, punctuation- and stopword-stripped key
///
/// Falls back to the plain token sequence when every word is a stopword,
/// so distinct short excuses do not collapse onto the empty key.
#[must_use]
pub fn normalize(text: &str) -> String {
    let content = content_tokens(text);
    if content.is_empty() {
        tokens(text).join(" ")
    } else {
        content.join(" ")
    }
}

/// Split on sentence punctuation and line breaks, dropping empty pieces
#[must_use]
pub fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Trim surrounding whitespace and punctuation from a clause
#[must_use]
pub fn trim_clause(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | ';' | ':' | '-' | '!' | '?' | '"' | '*'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_strips_case_punctuation_and_stopwords() {
        assert_eq!(normalize("Given the DEADLINE!"), "deadline");
        assert_eq!(normalize("I'll skip it, because it's too simple to test"), "skip simple test");
    }

    #[test]
    fn normalize_keeps_all_stopword_input_distinct() {
        assert_eq!(normalize("just this once"), "just this once");
        assert_eq!(normalize("it is what it is"), "it is what it is");
    }

    #[test]
    fn tokens_split_contractions() {
        assert_eq!(tokens("Don't"), vec!["don", "t"]);
        assert_eq!(tokens("I’ll go"), vec!["i", "ll", "go"]);
    }

    #[test]
    fn sentences_split_on_punctuation() {
        assert_eq!(sentences("A. B!\nC? "), vec!["A", "B", "C"]);
    }

    #[test]
    fn trim_clause_strips_punctuation() {
        assert_eq!(trim_clause(", given the deadline."), "given the deadline");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[A-Za-z ,.!']{0,40}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn normalize_ignores_case(s in "[A-Za-z ]{0,40}") {
            prop_assert_eq!(normalize(&s.to_uppercase()), normalize(&s.to_lowercase()));
        }
    }
}
