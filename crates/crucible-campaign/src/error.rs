//! Error types for campaigns
//!
//! Only systemic conditions surface here. Per-run failures (timeouts,
//! runtime errors, unparseable output) stay inside their transcript and
//! never abort a pass.

use crate::state::CampaignState;
use crucible_model::{Campaign, ModelError};
use crucible_refine::RefineError;
use crucible_store::StoreError;

/// Main campaign error type
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    /// Configuration rejected by validation
    #[error("configuration error: {0}")]
    Config(String),

    /// No active scenario to start a campaign with
    #[error("active scenario set is empty")]
    EmptyScenarioSet,

    /// The orchestrator attempted a transition outside the table
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: CampaignState,
        to: CampaignState,
    },

    /// `resume` on a campaign that already finished
    #[error("campaign {0} is already terminal")]
    AlreadyTerminal(String),

    /// Cancelled between passes; carries the campaign recorded so far
    #[error("campaign {} cancelled after {} iterations", .0.id, .0.iterations.len())]
    Cancelled(Box<Campaign>),

    /// Report hash chain does not verify
    #[error("audit chain broken at iteration {index}")]
    AuditChain { index: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("refinement error: {0}")]
    Refine(#[from] RefineError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl CampaignError {
    /// A human has to act before the campaign can make progress
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        match self {
            Self::Refine(e) => e.requires_human(),
            Self::AuditChain { .. } | Self::EmptyScenarioSet => true,
            _ => false,
        }
    }

    /// Running the same call again may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled(_) | Self::Io(_) => true,
            Self::Store(e) => e.is_backend_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_model::SkillId;

    #[test]
    fn cancelled_is_retryable_and_reports_progress() {
        let err = CampaignError::Cancelled(Box::new(Campaign::new(SkillId::new("tdd"))));
        assert!(err.is_retryable());
        assert!(err.to_string().ends_with("cancelled after 0 iterations"));
    }

    #[test]
    fn empty_scenario_set_requires_human() {
        assert!(CampaignError::EmptyScenarioSet.requires_human());
        assert!(!CampaignError::Config("x".into()).requires_human());
    }
}
