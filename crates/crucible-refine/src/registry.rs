//! Rationalization registry
//!
//! Deduplicates free-text rationalization candidates into stable
//! [`Signature`]s. A candidate resolves, in order, to:
//!
//! 1. an existing signature whose key or alias equals its normalized form
//! 2. the closest existing key or alias under the near-duplicate ratio
//!    (normalized edit distance)
//! 3. a seeded signature whose indicator terms appear in the candidate
//! 4. otherwise a new, novel signature keyed by the normalized form
//!
//! Paraphrases of one excuse therefore count as one failure, not many.

use crucible_classify::text::{normalize, tokens};
use crucible_model::Signature;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Default normalized edit distance under which candidates merge
pub const DEFAULT_NEAR_DUPLICATE_RATIO: f64 = 0.25;

/// Well-known pressure rationalizations and the terms that betray them
///
/// Words that are common outside the excuse they signal ("lead", "hour")
/// only appear inside a longer phrase.
pub const KNOWN_RATIONALIZATIONS: &[(&str, &[&str])] = &[
    (
        "time pressure justifies skipping",
        &[
            "deadline", "hurry", "rush", "rushed", "urgent", "asap", "demo", "behind schedule", "no time",
            "out of time", "in an hour", "few minutes",
        ],
    ),
    (
        "sunk cost justifies keeping",
        &["sunk", "already spent", "already wrote", "already written", "invested", "wasted", "throw away"],
    ),
    (
        "authority overrides the rule",
        &["manager", "boss", "tech lead", "team lead", "senior", "cto", "told me", "signed off", "ordered me"],
    ),
    (
        "economic stakes justify an exception",
        &["money", "revenue", "contract", "dollars", "budget", "paying customer", "customer is waiting", "client is waiting"],
    ),
    (
        "exhaustion justifies a shortcut",
        &["tired", "exhausted", "fatigue", "late night", "long day", "burned out"],
    ),
    (
        "social pressure justifies going along",
        &["everyone else", "colleagues", "look bad", "awkward", "peers"],
    ),
    (
        "pragmatism over process",
        &["pragmatic", "practical", "dogmatic", "spirit of the rule", "common sense", "overkill"],
    ),
];

/// One stable rationalization signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signature: Signature,
    /// First raw text that produced this signature
    pub example: String,
    /// Normalized variants merged into this signature
    pub aliases: IndexSet<String>,
    /// Terms that route candidates here (seeded entries only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indicators: Vec<String>,
    pub seeded: bool,
    /// Candidates resolved to this signature
    pub occurrences: u32,
}

/// Registry of rationalization signatures
#[derive(Debug, Clone)]
pub struct RationalizationRegistry {
    entries: IndexMap<Signature, SignatureEntry>,
    near_duplicate_ratio: f64,
}

impl Default for RationalizationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_DUPLICATE_RATIO)
    }
}

impl RationalizationRegistry {
    /// Empty registry
    #[must_use]
    pub fn new(near_duplicate_ratio: f64) -> Self {
        Self {
            entries: IndexMap::new(),
            near_duplicate_ratio,
        }
    }

    /// Registry pre-seeded with [`KNOWN_RATIONALIZATIONS`]
    #[must_use]
    pub fn with_known(near_duplicate_ratio: f64) -> Self {
        let mut registry = Self::new(near_duplicate_ratio);
        for (key, indicators) in KNOWN_RATIONALIZATIONS {
            registry.seed(key, indicators.iter().copied());
        }
        registry
    }

    /// Add a known signature; seeding an existing key only adds indicators
    pub fn seed<'a>(&mut self, key: &str, indicators: impl IntoIterator<Item = &'a str>) -> Signature {
        let signature = Signature::new(key.trim());
        let entry = self
            .entries
            .entry(signature.clone())
            .or_insert_with(|| SignatureEntry {
                signature: signature.clone(),
                example: key.trim().to_string(),
                aliases: IndexSet::new(),
                indicators: Vec::new(),
                seeded: true,
                occurrences: 0,
            });
        for term in indicators {
            let term = tokens(term).join(" ");
            if !term.is_empty() && !entry.indicators.contains(&term) {
                entry.indicators.push(term);
            }
        }
        signature
    }

    /// Resolve a candidate to its signature, registering it if unseen
    ///
    /// Returns the signature and whether it was newly registered.
    pub fn lookup_or_register(&mut self, candidate: &str) -> (Signature, bool) {
        let key = signature_key(candidate);
        if let Some(signature) = self.find(candidate, &key) {
            if let Some(entry) = self.entries.get_mut(&signature) {
                entry.occurrences += 1;
                if key != signature.as_str() {
                    entry.aliases.insert(key);
                }
            }
            return (signature, false);
        }

        let signature = Signature::new(key);
        tracing::debug!(%signature, "novel rationalization");
        self.entries.insert(
            signature.clone(),
            SignatureEntry {
                signature: signature.clone(),
                example: candidate.trim().to_string(),
                aliases: IndexSet::new(),
                indicators: Vec::new(),
                seeded: false,
                occurrences: 1,
            },
        );
        (signature, true)
    }

    /// Resolve without registering
    #[must_use]
    pub fn lookup(&self, candidate: &str) -> Option<Signature> {
        self.find(candidate, &signature_key(candidate))
    }

    fn find(&self, candidate: &str, key: &str) -> Option<Signature> {
        if let Some(entry) = self
            .entries
            .values()
            .find(|e| e.signature.as_str() == key || e.aliases.contains(key))
        {
            return Some(entry.signature.clone());
        }

        let nearest = self
            .entries
            .values()
            .flat_map(|e| {
                std::iter::once(e.signature.as_str())
                    .chain(e.aliases.iter().map(String::as_str))
                    .map(move |known| (normalized_distance(key, known), &e.signature))
            })
            .filter(|(distance, _)| *distance < self.near_duplicate_ratio)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, signature)) = nearest {
            return Some(signature.clone());
        }

        let words = tokens(candidate);
        self.entries
            .values()
            .filter(|e| e.seeded)
            .map(|e| (e.indicators.iter().filter(|t| contains_phrase(&words, t)).count(), &e.signature))
            .filter(|(hits, _)| *hits > 0)
            .fold(None, |best: Option<(usize, &Signature)>, (hits, sig)| match best {
                Some((top, _)) if top >= hits => best,
                _ => Some((hits, sig)),
            })
            .map(|(_, signature)| signature.clone())
    }

    #[must_use]
    pub fn get(&self, signature: &Signature) -> Option<&SignatureEntry> {
        self.entries.get(signature)
    }

    /// Raw text to quote when countering `signature`
    #[must_use]
    pub fn example(&self, signature: &Signature) -> Option<&str> {
        self.entries.get(signature).map(|e| e.example.as_str())
    }

    /// Every entry, in registration order
    pub fn entries(&self) -> impl Iterator<Item = &SignatureEntry> {
        self.entries.values()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn signature_key(candidate: &str) -> String {
    let key = normalize(candidate);
    if key.is_empty() {
        "unspecified".to_string()
    } else {
        key
    }
}

/// Whether the space-separated `phrase` occurs as a contiguous run in `words`
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    !needle.is_empty()
        && words
            .windows(needle.len())
            .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

/// Levenshtein distance over chars divided by the longer length
fn normalized_distance(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = previous[b.len()] as f64 / longest as f64;
    ratio
}
