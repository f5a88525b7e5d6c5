//! Error types for Crucible storage

use crate::persist::RecordKind;
use crucible_model::ModelError;

/// Storage and catalog errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Append-only violation: the key was already written
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: RecordKind, key: String },

    /// Scenario id already accepted into the catalog
    #[error("scenario {0} already exists")]
    DuplicateScenario(String),

    /// Retire or lookup of an id the catalog never accepted
    #[error("unknown scenario {0}")]
    UnknownScenario(String),

    /// Skill has no chain yet
    #[error("skill {0} has no version 0")]
    UnknownSkill(String),

    /// Publish out of sequence
    #[error("skill {skill}: expected version {expected}, got {actual}")]
    VersionGap {
        skill: String,
        expected: u32,
        actual: u32,
    },

    /// Chain was frozen after a campaign converged
    #[error("skill {skill} is frozen at version {version}")]
    Frozen { skill: String, version: u32 },

    /// Scenario or document failed validation
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors caused by the backing medium rather than by the caller
    #[inline]
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_record_kind() {
        let err = StoreError::AlreadyExists {
            kind: RecordKind::Document,
            key: "tdd@3".into(),
        };
        assert_eq!(err.to_string(), "document tdd@3 already exists");
        assert!(!err.is_backend_failure());
    }

    #[test]
    fn io_is_backend_failure() {
        let err = StoreError::from(std::io::Error::other("disk"));
        assert!(err.is_backend_failure());
    }
}
