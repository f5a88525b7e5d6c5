//! Run, decision and campaign records
//!
//! Everything here is plain data: the harness produces [`Transcript`]s, the
//! classifier (or a human) produces [`Decision`]s and the orchestrator folds
//! them into [`Iteration`]s of a [`Campaign`].

use crate::document::SkillId;
use crate::hash::ContentHash;
use crate::scenario::ScenarioId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Normalized rationalization fingerprint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-run failure, local to one transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    /// No response within the configured deadline
    TimedOut,
    /// Response could not be read as a decision
    Unparseable,
    /// The agent runtime failed
    RuntimeUnavailable { message: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::TimedOut => f.write_str("timed out"),
            RunError::Unparseable => f.write_str("unparseable output"),
            RunError::RuntimeUnavailable { message } => {
                write!(f, "runtime unavailable: {message}")
            }
        }
    }
}

/// Raw result of running one scenario against one document version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub scenario_id: ScenarioId,
    pub skill_version: u32,
    pub raw_output: String,
    pub chosen_option: Option<String>,
    pub error: Option<RunError>,
    pub elapsed_ms: u64,
}

impl Transcript {
    /// Transcript for a run that failed before producing usable output
    #[must_use]
    pub fn failed(scenario_id: ScenarioId, skill_version: u32, error: RunError, elapsed_ms: u64) -> Self {
        Self {
            scenario_id,
            skill_version,
            raw_output: String::new(),
            chosen_option: None,
            error: Some(error),
            elapsed_ms,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome class of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Compliant,
    Violation,
    Ambiguous,
}

/// Who produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    #[default]
    Classifier,
    Human,
}

/// Typed decision for one transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub scenario_id: ScenarioId,
    pub classification: Classification,
    pub chosen_option: Option<String>,
    /// Justification text the agent gave, verbatim
    pub rationalization: Option<String>,
    /// Registry signature the rationalization resolved to
    pub signature: Option<Signature>,
    #[serde(default)]
    pub source: DecisionSource,
    /// Why the classifier or reviewer landed here
    #[serde(default)]
    pub note: Option<String>,
}

impl Decision {
    #[must_use]
    pub fn compliant(scenario_id: ScenarioId, chosen: impl Into<String>) -> Self {
        Self {
            scenario_id,
            classification: Classification::Compliant,
            chosen_option: Some(chosen.into()),
            rationalization: None,
            signature: None,
            source: DecisionSource::Classifier,
            note: None,
        }
    }

    #[must_use]
    pub fn violation(
        scenario_id: ScenarioId,
        chosen: Option<String>,
        rationalization: impl Into<String>,
    ) -> Self {
        Self {
            scenario_id,
            classification: Classification::Violation,
            chosen_option: chosen,
            rationalization: Some(rationalization.into()),
            signature: None,
            source: DecisionSource::Classifier,
            note: None,
        }
    }

    #[must_use]
    pub fn ambiguous(scenario_id: ScenarioId, note: impl Into<String>) -> Self {
        Self {
            scenario_id,
            classification: Classification::Ambiguous,
            chosen_option: None,
            rationalization: None,
            signature: None,
            source: DecisionSource::Classifier,
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn with_rationalization(mut self, text: impl Into<String>) -> Self {
        self.rationalization = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn from_human(mut self) -> Self {
        self.source = DecisionSource::Human;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        self.classification == Classification::Compliant
    }

    #[inline]
    #[must_use]
    pub fn is_violation(&self) -> bool {
        self.classification == Classification::Violation
    }

    #[inline]
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.classification == Classification::Ambiguous
    }
}

/// Decision counts for one pass; Ambiguous and aborted runs count in
/// neither the compliant nor the violation column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub compliant: usize,
    pub violation: usize,
    pub ambiguous: usize,
    pub aborted: usize,
}

impl Tally {
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.compliant + self.violation + self.ambiguous + self.aborted
    }

    /// Share of scheduled scenarios that were Compliant
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compliance_rate(&self) -> f64 {
        match self.scheduled() {
            0 => 0.0,
            n => self.compliant as f64 / n as f64,
        }
    }

    /// Every scheduled scenario Compliant
    #[must_use]
    pub fn all_compliant(&self) -> bool {
        self.scheduled() > 0 && self.compliant == self.scheduled()
    }
}

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Continue,
    Bulletproof,
    Abandoned,
}

/// One full pass over the active scenarios at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub index: u32,
    pub version: u32,
    pub document_hash: ContentHash,
    pub transcripts: Vec<Transcript>,
    pub decisions: Vec<Decision>,
    pub novel_signatures: Vec<Signature>,
    pub aborted: Vec<ScenarioId>,
    pub outcome: IterationOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Iteration {
    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally {
            aborted: self.aborted.len(),
            ..Tally::default()
        };
        for decision in &self.decisions {
            match decision.classification {
                Classification::Compliant => tally.compliant += 1,
                Classification::Violation => tally.violation += 1,
                Classification::Ambiguous => tally.ambiguous += 1,
            }
        }
        tally
    }
}

/// Campaign identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub Ulid);

impl CampaignId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why convergence was judged unreachable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbandonReason {
    /// A countered rationalization came back
    LoopholeRecurrence {
        signature: Signature,
        first_countered_in: u32,
        recurred_at: u32,
    },
    /// Iteration cap reached without convergence
    IterationCapExceeded { cap: u32 },
    /// Every scenario was retired mid-campaign
    EmptyScenarioSet,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::LoopholeRecurrence {
                signature,
                first_countered_in,
                recurred_at,
            } => write!(
                f,
                "loophole recurrence: {signature:?} countered in version {first_countered_in} recurred at version {recurred_at}"
            ),
            AbandonReason::IterationCapExceeded { cap } => {
                write!(f, "iteration cap of {cap} exceeded")
            }
            AbandonReason::EmptyScenarioSet => f.write_str("active scenario set is empty"),
        }
    }
}

/// What a human needs to pick up an abandoned campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abandonment {
    pub reason: AbandonReason,
    pub unresolved_signatures: Vec<Signature>,
    pub last_stable_version: u32,
}

/// Lifecycle status of a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CampaignStatus {
    Running,
    Bulletproof { final_version: u32 },
    Abandoned(Abandonment),
}

/// Record of one test-and-refine campaign for one skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub skill: SkillId,
    pub iterations: Vec<Iteration>,
    pub status: CampaignStatus,
    pub started_at: DateTime<Utc>,
}

impl Campaign {
    #[must_use]
    pub fn new(skill: SkillId) -> Self {
        Self {
            id: CampaignId::new(),
            skill,
            iterations: Vec::new(),
            status: CampaignStatus::Running,
            started_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, CampaignStatus::Running)
    }

    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    #[inline]
    #[must_use]
    pub fn is_bulletproof(&self) -> bool {
        matches!(self.status, CampaignStatus::Bulletproof { .. })
    }

    #[inline]
    #[must_use]
    pub fn abandonment(&self) -> Option<&Abandonment> {
        match &self.status {
            CampaignStatus::Abandoned(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iteration(decisions: Vec<Decision>, aborted: Vec<ScenarioId>) -> Iteration {
        Iteration {
            index: 0,
            version: 0,
            document_hash: ContentHash::compute(b"doc"),
            transcripts: vec![],
            decisions,
            novel_signatures: vec![],
            aborted,
            outcome: IterationOutcome::Continue,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn tally_excludes_ambiguous_from_both_columns() {
        let it = iteration(
            vec![
                Decision::compliant("a".into(), "A"),
                Decision::violation("b".into(), Some("C".into()), "given the deadline"),
                Decision::ambiguous("c".into(), "timed out"),
            ],
            vec![],
        );
        let tally = it.tally();
        assert_eq!(tally.compliant, 1);
        assert_eq!(tally.violation, 1);
        assert_eq!(tally.ambiguous, 1);
        assert!(!tally.all_compliant());
    }

    #[test]
    fn aborted_runs_block_all_compliant() {
        let it = iteration(
            vec![Decision::compliant("a".into(), "A")],
            vec![ScenarioId::new("b")],
        );
        assert!(!it.tally().all_compliant());
        assert!((it.tally().compliance_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_tally_is_not_all_compliant() {
        assert!(!Tally::default().all_compliant());
    }

    #[test]
    fn run_error_serializes_tagged() {
        let json = serde_json::to_string(&RunError::TimedOut).unwrap();
        assert_eq!(json, r#"{"kind":"timed_out"}"#);
    }

    #[test]
    fn campaign_status_roundtrips() {
        let mut campaign = Campaign::new(SkillId::new("tdd"));
        campaign.status = CampaignStatus::Abandoned(Abandonment {
            reason: AbandonReason::IterationCapExceeded { cap: 3 },
            unresolved_signatures: vec![Signature::new("deadline")],
            last_stable_version: 2,
        });
        let json = serde_json::to_string(&campaign).unwrap();
        let back: Campaign = serde_json::from_str(&json).unwrap();
        assert_eq!(back, campaign);
        assert!(back.is_terminal());
        assert_eq!(back.abandonment().map(|a| a.last_stable_version), Some(2));
    }
}
