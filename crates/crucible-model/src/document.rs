//! Versioned skill documents
//!
//! A [`SkillDocument`] is one immutable version of a governance text. The
//! only way to obtain version N+1 is [`SkillDocument::augment`], which copies
//! version N and appends; [`SkillDocument::check_extends`] re-verifies that
//! property for any pair of versions, whatever produced them.

use crate::error::ModelError;
use crate::hash::ContentHash;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Skill identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(String);

impl SkillId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable version of a skill document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDocument {
    skill: SkillId,
    version: u32,
    description: String,
    rules: Vec<String>,
    rationalization_table: IndexMap<String, String>,
    red_flags: IndexSet<String>,
    description_triggers: IndexSet<String>,
}

impl SkillDocument {
    /// Start a version-0 draft
    #[must_use]
    pub fn draft(skill: SkillId, description: impl Into<String>) -> Self {
        Self {
            skill,
            version: 0,
            description: description.into(),
            rules: Vec::new(),
            rationalization_table: IndexMap::new(),
            red_flags: IndexSet::new(),
            description_triggers: IndexSet::new(),
        }
    }

    /// Authoring helper: append a rule clause to a draft
    #[must_use]
    pub fn with_rule(mut self, clause: impl Into<String>) -> Self {
        self.rules.push(clause.into());
        self
    }

    /// Authoring helper: add a rationalization-table row to a draft
    #[must_use]
    pub fn with_counter(mut self, signature: impl Into<String>, counter: impl Into<String>) -> Self {
        self.rationalization_table
            .insert(signature.into(), counter.into());
        self
    }

    /// Authoring helper: add a red-flag phrase to a draft
    #[must_use]
    pub fn with_red_flag(mut self, phrase: impl Into<String>) -> Self {
        self.red_flags.insert(phrase.into());
        self
    }

    /// Authoring helper: add a description trigger to a draft
    #[must_use]
    pub fn with_trigger(mut self, phrase: impl Into<String>) -> Self {
        self.description_triggers.insert(phrase.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn skill(&self) -> &SkillId {
        &self.skill
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    #[must_use]
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    #[inline]
    #[must_use]
    pub fn rationalization_table(&self) -> &IndexMap<String, String> {
        &self.rationalization_table
    }

    #[inline]
    #[must_use]
    pub fn red_flags(&self) -> &IndexSet<String> {
        &self.red_flags
    }

    #[inline]
    #[must_use]
    pub fn description_triggers(&self) -> &IndexSet<String> {
        &self.description_triggers
    }

    /// Whether the table already carries a row for `signature`
    #[inline]
    #[must_use]
    pub fn counters(&self, signature: &str) -> bool {
        self.rationalization_table.contains_key(signature)
    }

    /// Blake3 hash of the canonical markdown rendering
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.render_markdown().as_bytes())
    }

    /// Produce the next version by copying this one and appending
    ///
    /// Additions already present are skipped. A table row whose signature
    /// exists with different counter text would be an in-place edit and is
    /// rejected.
    ///
    /// # Errors
    /// - `ModelError::EmptyAugmentation` if nothing new would be added
    /// - `ModelError::NonMonotonic` if an addition would edit existing content
    pub fn augment(&self, augmentation: &Augmentation) -> Result<Self, ModelError> {
        let mut next = self.clone();
        next.version = self.version + 1;
        let mut added = 0usize;

        for clause in &augmentation.rules {
            if !next.rules.iter().any(|r| r == clause) {
                next.rules.push(clause.clone());
                added += 1;
            }
        }
        for (signature, counter) in &augmentation.counters {
            match next.rationalization_table.get(signature) {
                Some(existing) if existing == counter => {}
                Some(_) => {
                    return Err(ModelError::NonMonotonic {
                        skill: self.skill.to_string(),
                        version: next.version,
                        reason: format!("counter for {signature:?} would be rewritten"),
                    })
                }
                None => {
                    next.rationalization_table
                        .insert(signature.clone(), counter.clone());
                    added += 1;
                }
            }
        }
        for phrase in &augmentation.red_flags {
            if next.red_flags.insert(phrase.clone()) {
                added += 1;
            }
        }
        for phrase in &augmentation.triggers {
            if next.description_triggers.insert(phrase.clone()) {
                added += 1;
            }
        }

        if added == 0 {
            return Err(ModelError::EmptyAugmentation {
                skill: self.skill.to_string(),
                version: self.version,
            });
        }
        next.check_extends(self)?;
        Ok(next)
    }

    /// Verify that `self` is the direct, strictly additive successor of
    /// `previous`
    ///
    /// # Errors
    /// `ModelError::NonMonotonic` naming the first content that was lost or
    /// edited.
    pub fn check_extends(&self, previous: &SkillDocument) -> Result<(), ModelError> {
        let fail = |reason: String| ModelError::NonMonotonic {
            skill: self.skill.to_string(),
            version: self.version,
            reason,
        };

        if self.skill != previous.skill {
            return Err(fail(format!("belongs to skill {}", previous.skill)));
        }
        if self.version != previous.version + 1 {
            return Err(fail(format!("does not follow version {}", previous.version)));
        }
        if self.description != previous.description {
            return Err(fail("description changed".into()));
        }
        if self.rules.len() < previous.rules.len() {
            return Err(fail("rules were removed".into()));
        }
        if let Some((i, _)) = previous
            .rules
            .iter()
            .zip(&self.rules)
            .enumerate()
            .find(|(_, (old, new))| old != new)
        {
            return Err(fail(format!("rule {} was edited", i + 1)));
        }
        for (signature, counter) in &previous.rationalization_table {
            if self.rationalization_table.get(signature) != Some(counter) {
                return Err(fail(format!("table row {signature:?} was removed or edited")));
            }
        }
        if let Some(flag) = previous.red_flags.iter().find(|f| !self.red_flags.contains(*f)) {
            return Err(fail(format!("red flag {flag:?} was removed")));
        }
        if let Some(trigger) = previous
            .description_triggers
            .iter()
            .find(|t| !self.description_triggers.contains(*t))
        {
            return Err(fail(format!("trigger {trigger:?} was removed")));
        }
        Ok(())
    }

    /// Rebuild a document from its parts; used by the markdown importer
    pub(crate) fn from_parts(
        skill: SkillId,
        version: u32,
        description: String,
        rules: Vec<String>,
        rationalization_table: IndexMap<String, String>,
        red_flags: IndexSet<String>,
        description_triggers: IndexSet<String>,
    ) -> Self {
        Self {
            skill,
            version,
            description,
            rules,
            rationalization_table,
            red_flags,
            description_triggers,
        }
    }
}

/// Content to append when producing the next version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Augmentation {
    pub rules: Vec<String>,
    pub counters: Vec<(String, String)>,
    pub red_flags: Vec<String>,
    pub triggers: Vec<String>,
}

impl Augmentation {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && self.counters.is_empty()
            && self.red_flags.is_empty()
            && self.triggers.is_empty()
    }
}
