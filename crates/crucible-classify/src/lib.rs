//! Crucible Classify: decisions from free-text agent responses
//!
//! Classification is approximate by nature, so it is kept behind narrow
//! typed contracts:
//!
//! - [`OptionMatcher`]: text + option labels -> match / no match / confidence
//! - [`DecisionClassifier`]: transcript + scenario -> [`crucible_model::Decision`]
//! - [`text::normalize`]: the canonical key used for rationalization signatures

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod classifier;
pub mod extract;
pub mod matcher;
pub mod text;

pub use classifier::DecisionClassifier;
pub use extract::{explicit_selection, Endorsement};
pub use matcher::{
    KeywordMatcher, MatchOutcome, OptionMatcher, OptionScore, DEFAULT_MATCH_THRESHOLD, MENTION_SCORE,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
