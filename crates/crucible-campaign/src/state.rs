//! Campaign state machine
//!
//! ```text
//! Collecting -> Evaluating -> Refining   -> Collecting
//!                          -> Collecting   (same version, nothing to counter)
//!                          -> Bulletproof
//!                          -> Abandoned
//! ```
//!
//! `Collecting` may also go straight to `Abandoned` when the iteration cap
//! is hit or the active scenario set is empty. Terminal states have no exits.

use crate::error::CampaignError;
use serde::{Deserialize, Serialize};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Collecting,
    Evaluating,
    Refining,
    Bulletproof,
    Abandoned,
}

impl CampaignState {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Bulletproof | Self::Abandoned)
    }
}

#[must_use]
pub fn allowed_transitions(from: CampaignState) -> &'static [CampaignState] {
    use CampaignState::*;
    match from {
        Collecting => &[Evaluating, Abandoned],
        Evaluating => &[Refining, Collecting, Bulletproof, Abandoned],
        Refining => &[Collecting, Abandoned],
        Bulletproof | Abandoned => &[],
    }
}

/// # Errors
/// `CampaignError::IllegalTransition` if `to` is not reachable from `from`.
pub fn validate_transition(from: CampaignState, to: CampaignState) -> Result<(), CampaignError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(CampaignError::IllegalTransition { from, to })
    }
}

/// Current state plus validated moves
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: CampaignState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Starts in `Collecting`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CampaignState::Collecting,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CampaignState {
        self.state
    }

    /// # Errors
    /// `CampaignError::IllegalTransition` for moves outside the table.
    pub fn advance(&mut self, to: CampaignState) -> Result<(), CampaignError> {
        validate_transition(self.state, to)?;
        tracing::debug!(from = ?self.state, ?to, "campaign transition");
        self.state = to;
        Ok(())
    }
}
