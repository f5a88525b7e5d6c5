//! Error types for the Crucible model

/// Errors raised while authoring scenarios and documents
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Scenario rejected before it could enter the catalog
    #[error("invalid scenario {id}: {reason}")]
    InvalidScenario { id: String, reason: String },

    /// A candidate version removes or edits content of its predecessor
    #[error("version {version} of skill {skill} is not a monotonic augmentation: {reason}")]
    NonMonotonic {
        skill: String,
        version: u32,
        reason: String,
    },

    /// An augmentation that would add nothing new
    #[error("augmentation of skill {skill} at version {version} adds no content")]
    EmptyAugmentation { skill: String, version: u32 },

    /// Skill markdown could not be imported
    #[error("malformed skill markdown: {0}")]
    Markdown(String),

    /// Frontmatter is not valid YAML
    #[error("frontmatter error: {0}")]
    Frontmatter(#[from] serde_yaml::Error),
}

impl ModelError {
    /// Shorthand for an invalid scenario
    #[inline]
    pub fn invalid_scenario(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Errors a scenario author can fix by editing the scenario
    #[inline]
    #[must_use]
    pub fn is_authoring_error(&self) -> bool {
        matches!(self, Self::InvalidScenario { .. } | Self::Markdown(_) | Self::Frontmatter(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_scenario() {
        let err = ModelError::invalid_scenario("deadline-1", "fewer than two options");
        assert_eq!(
            err.to_string(),
            "invalid scenario deadline-1: fewer than two options"
        );
        assert!(err.is_authoring_error());
    }

    #[test]
    fn non_monotonic_is_not_authoring() {
        let err = ModelError::NonMonotonic {
            skill: "tdd".into(),
            version: 3,
            reason: "rule 1 changed".into(),
        };
        assert!(!err.is_authoring_error());
    }
}
