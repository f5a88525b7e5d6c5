//! Error types for refinement

use crucible_model::{ModelError, Signature};

/// Refinement and recurrence-guard errors
#[derive(Debug, thiserror::Error)]
pub enum RefineError {
    /// Every target is already countered by the current document
    #[error("nothing to counter in version {version}")]
    NothingToCounter { version: u32 },

    /// A countered signature came back often enough to trip the guard
    #[error("loophole recurrence: {signature} countered in v{first_countered_in} recurred at v{recurred_at}")]
    LoopholeRecurrence {
        signature: Signature,
        first_countered_in: u32,
        recurred_at: u32,
    },

    /// The augmented document failed the monotonic check
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RefineError {
    /// Conditions a human has to resolve; retrying the loop will not help
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::LoopholeRecurrence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurrence_requires_human() {
        let err = RefineError::LoopholeRecurrence {
            signature: Signature::new("deadline"),
            first_countered_in: 1,
            recurred_at: 3,
        };
        assert!(err.requires_human());
        assert_eq!(
            err.to_string(),
            "loophole recurrence: deadline countered in v1 recurred at v3"
        );
        assert!(!RefineError::NothingToCounter { version: 2 }.requires_human());
    }
}
