//! Recurrence guard
//!
//! Remembers which version first countered each signature. A violation that
//! still resolves to a countered signature is a loophole the counter did not
//! close; after `limit` such recurrences the guard trips.

use crate::error::RefineError;
use crucible_model::{Signature, SkillDocument};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Default number of recurrences tolerated before the guard trips
pub const DEFAULT_RECURRENCE_LIMIT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countered {
    first_countered_in: u32,
    recurrences: u32,
}

/// Tracks countered signatures and their recurrences
#[derive(Debug, Clone)]
pub struct RecurrenceGuard {
    limit: u32,
    countered: IndexMap<Signature, Countered>,
}

impl Default for RecurrenceGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RECURRENCE_LIMIT)
    }
}

impl RecurrenceGuard {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            countered: IndexMap::new(),
        }
    }

    /// Record every table row of `document` not seen before as countered in
    /// its version
    pub fn track(&mut self, document: &SkillDocument) {
        for key in document.rationalization_table().keys() {
            self.countered
                .entry(Signature::new(key.as_str()))
                .or_insert(Countered {
                    first_countered_in: document.version(),
                    recurrences: 0,
                });
        }
    }

    /// Version whose table first countered `signature`
    #[must_use]
    pub fn countered_in(&self, signature: &Signature) -> Option<u32> {
        self.countered.get(signature).map(|c| c.first_countered_in)
    }

    #[must_use]
    pub fn recurrences(&self, signature: &Signature) -> u32 {
        self.countered.get(signature).map_or(0, |c| c.recurrences)
    }

    /// Count one pass's violation signatures against the countered set
    ///
    /// A signature counts at most once per pass.
    ///
    /// # Errors
    /// `RefineError::LoopholeRecurrence` for the first signature whose
    /// recurrences reach the limit.
    pub fn observe<'a>(
        &mut self,
        violations: impl IntoIterator<Item = &'a Signature>,
        version: u32,
    ) -> Result<(), RefineError> {
        let mut seen = HashSet::new();
        let mut tripped = None;
        for signature in violations {
            if !seen.insert(signature) {
                continue;
            }
            let Some(entry) = self.countered.get_mut(signature) else {
                continue;
            };
            if version < entry.first_countered_in {
                continue;
            }
            entry.recurrences += 1;
            tracing::warn!(
                %signature,
                first_countered_in = entry.first_countered_in,
                version,
                recurrences = entry.recurrences,
                "countered rationalization recurred"
            );
            if entry.recurrences >= self.limit && tripped.is_none() {
                tripped = Some(RefineError::LoopholeRecurrence {
                    signature: signature.clone(),
                    first_countered_in: entry.first_countered_in,
                    recurred_at: version,
                });
            }
        }
        tripped.map_or(Ok(()), Err)
    }
}
