//! Refinement engine
//!
//! A pure function from (current version, findings) to the next version.
//! The engine fills fixed patch slots; it never writes free prose:
//!
//! - a negation clause appended to the rules
//! - a rationalization-table row keyed by the signature
//! - a red-flag phrase quoting the excuse
//! - description triggers for the pressures that provoked it (optional)

use crate::error::RefineError;
use crate::text_slots::{counter_text, negation_clause, red_flag};
use crucible_model::{Augmentation, Pressure, Signature, SkillDocument};
use std::collections::{BTreeSet, HashSet};

/// A signature to counter, with the evidence that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub signature: Signature,
    /// Raw rationalization text as the agent phrased it
    pub example: String,
    /// Pressures of the scenarios where it appeared
    pub pressures: BTreeSet<Pressure>,
}

impl Finding {
    #[must_use]
    pub fn new(signature: Signature, example: impl Into<String>) -> Self {
        Self {
            signature,
            example: example.into(),
            pressures: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_pressures(mut self, pressures: impl IntoIterator<Item = Pressure>) -> Self {
        self.pressures.extend(pressures);
        self
    }
}

/// Produces version N+1 by monotonic augmentation
#[derive(Debug, Clone, Copy)]
pub struct RefinementEngine {
    extend_triggers: bool,
}

impl Default for RefinementEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RefinementEngine {
    #[must_use]
    pub fn new(extend_triggers: bool) -> Self {
        Self { extend_triggers }
    }

    /// Patch slots for every finding `current` does not counter yet
    #[must_use]
    pub fn patch(&self, current: &SkillDocument, findings: &[Finding]) -> Augmentation {
        let mut augmentation = Augmentation::new();
        let mut seen = HashSet::new();
        for finding in findings {
            if current.counters(finding.signature.as_str()) || !seen.insert(&finding.signature) {
                continue;
            }
            augmentation.rules.push(negation_clause(&finding.example));
            augmentation
                .counters
                .push((finding.signature.to_string(), counter_text(&finding.example)));
            augmentation.red_flags.push(red_flag(&finding.example));
            if self.extend_triggers {
                for pressure in &finding.pressures {
                    let phrase = pressure.trigger_phrase().to_string();
                    if !augmentation.triggers.contains(&phrase) {
                        augmentation.triggers.push(phrase);
                    }
                }
            }
        }
        augmentation
    }

    /// Build and verify the next version
    ///
    /// # Errors
    /// - `RefineError::NothingToCounter` when `current` already counters
    ///   every finding
    /// - `RefineError::Model` if the result is not a strict extension
    pub fn refine(&self, current: &SkillDocument, findings: &[Finding]) -> Result<SkillDocument, RefineError> {
        let augmentation = self.patch(current, findings);
        if augmentation.counters.is_empty() {
            return Err(RefineError::NothingToCounter {
                version: current.version(),
            });
        }
        let next = current.augment(&augmentation)?;
        next.check_extends(current)?;
        tracing::info!(
            skill = %next.skill(),
            version = next.version(),
            countered = augmentation.counters.len(),
            "refined skill document"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_model::SkillId;
    use pretty_assertions::assert_eq;

    fn v0() -> SkillDocument {
        SkillDocument::draft(SkillId::new("tdd"), "Use when writing code")
            .with_rule("No production code without a failing test first.")
    }

    fn finding() -> Finding {
        Finding::new(Signature::new("code simple test"), "because the code is too simple to test")
            .with_pressures([Pressure::Time, Pressure::Pragmatic])
    }

    #[test]
    fn refine_fills_every_slot() {
        let v1 = RefinementEngine::default().refine(&v0(), &[finding()]).unwrap();
        assert_eq!(v1.version(), 1);
        assert_eq!(v1.rules().len(), 2);
        assert!(v1.counters("code simple test"));
        assert!(v1.red_flags().contains("the code is too simple to test"));
        assert_eq!(
            v1.description_triggers().iter().cloned().collect::<Vec<_>>(),
            vec![
                Pressure::Time.trigger_phrase().to_string(),
                Pressure::Pragmatic.trigger_phrase().to_string()
            ]
        );
    }

    #[test]
    fn refine_keeps_everything_from_previous_version() {
        let base = v0();
        let v1 = RefinementEngine::default().refine(&base, &[finding()]).unwrap();
        v1.check_extends(&base).unwrap();
        assert_eq!(v1.rules()[0], base.rules()[0]);
    }

    #[test]
    fn already_countered_is_nothing_to_do() {
        let engine = RefinementEngine::default();
        let v1 = engine.refine(&v0(), &[finding()]).unwrap();
        let err = engine.refine(&v1, &[finding()]).unwrap_err();
        assert!(matches!(err, RefineError::NothingToCounter { version: 1 }));
    }

    #[test]
    fn triggers_are_optional() {
        let v1 = RefinementEngine::new(false).refine(&v0(), &[finding()]).unwrap();
        assert!(v1.description_triggers().is_empty());
    }

    #[test]
    fn duplicate_findings_patch_once() {
        let patch = RefinementEngine::default().patch(&v0(), &[finding(), finding()]);
        assert_eq!(patch.counters.len(), 1);
        assert_eq!(patch.rules.len(), 1);
    }
}
