//! Human reviewer collaborator
//!
//! Ambiguous decisions are offered to a reviewer before a pass is judged. A
//! returned decision replaces the classifier's verdict as ground truth; the
//! harness is not re-run. Abandoned campaigns are handed over the same way.

use async_trait::async_trait;
use crucible_model::{Campaign, Decision, Scenario, Transcript};

/// Receives ambiguous decisions and abandoned campaigns
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HumanReviewer: Send + Sync {
    /// Optionally override an Ambiguous decision
    async fn review(&self, scenario: &Scenario, transcript: &Transcript, decision: &Decision) -> Option<Decision>;

    /// Told once when a campaign is abandoned
    async fn notify_abandoned(&self, campaign: &Campaign);
}

/// Leaves every decision as classified and only logs hand-overs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReviewer;

#[async_trait]
impl HumanReviewer for NoReviewer {
    async fn review(&self, scenario: &Scenario, _transcript: &Transcript, decision: &Decision) -> Option<Decision> {
        tracing::info!(
            scenario = %scenario.id(),
            note = decision.note.as_deref().unwrap_or(""),
            "ambiguous decision awaiting manual review"
        );
        None
    }

    async fn notify_abandoned(&self, campaign: &Campaign) {
        if let Some(abandonment) = campaign.abandonment() {
            tracing::warn!(
                campaign = %campaign.id,
                skill = %campaign.skill,
                reason = %abandonment.reason,
                last_stable_version = abandonment.last_stable_version,
                "campaign abandoned"
            );
        }
    }
}
