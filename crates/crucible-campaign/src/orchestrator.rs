//! Campaign orchestrator and convergence detector
//!
//! Drives one skill through Collecting -> Evaluating -> Refining until the
//! document is Bulletproof or the campaign is Abandoned:
//!
//! 1. Collecting: run every active scenario (plus runs aborted last pass)
//!    against the current version; the pass ends at a join-all barrier
//! 2. Evaluating: classify, offer Ambiguous decisions to the reviewer, fold
//!    rationalizations into signatures, check the recurrence guard
//! 3. Refining: publish version N+1 with counters for the findings
//!
//! Versions are strictly serialized: the next pass always runs against the
//! version the previous Evaluating/Refining step left behind.

use crate::config::CampaignConfig;
use crate::error::CampaignError;
use crate::harness::{CancelHandle, ExecutionHarness, PassResult};
use crate::report::CampaignReport;
use crate::reviewer::{HumanReviewer, NoReviewer};
use crate::runtime::AgentRuntime;
use crate::state::{CampaignState, StateMachine};
use chrono::Utc;
use crucible_classify::DecisionClassifier;
use crucible_model::{
    AbandonReason, Abandonment, Campaign, CampaignStatus, Decision, Iteration, IterationOutcome, Scenario,
    ScenarioId, Signature, SkillDocument, SkillId,
};
use crucible_refine::{Finding, RationalizationRegistry, RecurrenceGuard, RefineError, RefinementEngine};
use crucible_store::{PersistentStore, ScenarioCatalog, SkillVersionStore, StoreError};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Classified pass, ready for the convergence decision
#[derive(Debug, Default)]
struct Evaluation {
    decisions: Vec<Decision>,
    novel: Vec<Signature>,
    violations: Vec<Signature>,
    findings: Vec<Finding>,
}

/// What the Evaluating step decided
#[derive(Debug)]
enum Verdict {
    Bulletproof,
    Abandon(AbandonReason),
    /// Nothing to counter but not all Compliant: same version again
    Repeat,
    Refine(Vec<Finding>),
}

/// Drives test-and-refine campaigns
pub struct CampaignOrchestrator {
    config: CampaignConfig,
    store: Arc<dyn PersistentStore>,
    catalog: Arc<ScenarioCatalog>,
    versions: Arc<SkillVersionStore>,
    harness: ExecutionHarness,
    classifier: DecisionClassifier,
    registry: RationalizationRegistry,
    engine: RefinementEngine,
    guard: RecurrenceGuard,
    reviewer: Arc<dyn HumanReviewer>,
    cancel: CancelHandle,
    machine: StateMachine,
}

impl std::fmt::Debug for CampaignOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignOrchestrator")
            .field("config", &self.config)
            .field("state", &self.machine.state())
            .field("signatures", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl CampaignOrchestrator {
    /// # Errors
    /// `CampaignError::Config` if `config` does not validate.
    pub fn new(
        config: CampaignConfig,
        store: Arc<dyn PersistentStore>,
        catalog: Arc<ScenarioCatalog>,
        versions: Arc<SkillVersionStore>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Result<Self, CampaignError> {
        config.validate()?;
        Ok(Self {
            harness: ExecutionHarness::new(runtime, config.run_deadline(), config.max_concurrent_runs),
            classifier: DecisionClassifier::new(config.match_threshold),
            registry: RationalizationRegistry::with_known(config.near_duplicate_ratio),
            engine: RefinementEngine::new(config.extend_triggers),
            guard: RecurrenceGuard::new(config.recurrence_limit),
            reviewer: Arc::new(NoReviewer),
            cancel: CancelHandle::new(),
            machine: StateMachine::new(),
            config,
            store,
            catalog,
            versions,
        })
    }

    #[must_use]
    pub fn with_reviewer(mut self, reviewer: Arc<dyn HumanReviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: RationalizationRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: DecisionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CampaignState {
        self.machine.state()
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &RationalizationRegistry {
        &self.registry
    }

    /// Handle that aborts the running pass from another task
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Start a campaign at the skill's current head (version 0 for a fresh
    /// draft)
    ///
    /// An Abandoned campaign is a normal result; inspect its status.
    ///
    /// # Errors
    /// - `CampaignError::EmptyScenarioSet` if nothing is active at the start
    /// - `CampaignError::Cancelled` carrying the campaign so far
    /// - store failures
    pub async fn run(&mut self, skill: &SkillId) -> Result<Campaign, CampaignError> {
        let document = self
            .versions
            .latest(skill)
            .ok_or_else(|| StoreError::UnknownSkill(skill.to_string()))?;
        if self.catalog.list_active(self.config.min_pressure_count).is_empty() {
            return Err(CampaignError::EmptyScenarioSet);
        }
        self.prime(skill);
        let campaign = Campaign::new(skill.clone());
        tracing::info!(
            campaign = %campaign.id,
            %skill,
            version = document.version(),
            "campaign started"
        );
        self.drive(campaign, document).await
    }

    /// Continue a cancelled campaign from its latest version
    ///
    /// # Errors
    /// `CampaignError::AlreadyTerminal` for finished campaigns, otherwise as
    /// [`run`](Self::run).
    pub async fn resume(&mut self, campaign: Campaign) -> Result<Campaign, CampaignError> {
        if campaign.is_terminal() {
            return Err(CampaignError::AlreadyTerminal(campaign.id.to_string()));
        }
        let document = self
            .versions
            .latest(&campaign.skill)
            .ok_or_else(|| StoreError::UnknownSkill(campaign.skill.to_string()))?;
        self.prime(&campaign.skill);
        for iteration in &campaign.iterations {
            // Replayed only to restore recurrence counts; a trip here was
            // already acted on when the iteration ran.
            let _ = self.guard.observe(violation_signatures(&iteration.decisions).iter(), iteration.version);
        }
        tracing::info!(campaign = %campaign.id, iterations = campaign.iterations.len(), "campaign resumed");
        self.drive(campaign, document).await
    }

    /// Report for `campaign` against the skill's latest version
    ///
    /// # Errors
    /// Unknown skill or serialization failures.
    pub fn report(&self, campaign: &Campaign) -> Result<CampaignReport, CampaignError> {
        let document = self
            .versions
            .latest(&campaign.skill)
            .ok_or_else(|| StoreError::UnknownSkill(campaign.skill.to_string()))?;
        CampaignReport::build(campaign, &document, &self.registry)
    }

    /// Reset per-campaign state and learn the countered signatures already
    /// in the chain
    ///
    /// Clears a cancellation left over from an earlier campaign.
    fn prime(&mut self, skill: &SkillId) {
        self.cancel.reset();
        self.machine = StateMachine::new();
        self.guard = RecurrenceGuard::new(self.config.recurrence_limit);
        for version in self.versions.history(skill) {
            self.guard.track(&version);
            for key in version.rationalization_table().keys() {
                self.registry.seed(key, std::iter::empty());
            }
        }
    }

    async fn drive(&mut self, mut campaign: Campaign, mut document: Arc<SkillDocument>) -> Result<Campaign, CampaignError> {
        loop {
            let index = u32::try_from(campaign.iterations.len()).unwrap_or(u32::MAX);
            if index >= self.config.max_iterations {
                let cap = self.config.max_iterations;
                return self
                    .abandon(campaign, &document, AbandonReason::IterationCapExceeded { cap })
                    .await;
            }
            let scenarios = self.schedule(&campaign);
            if scenarios.is_empty() {
                return self.abandon(campaign, &document, AbandonReason::EmptyScenarioSet).await;
            }

            // Collecting
            let started_at = Utc::now();
            tracing::info!(
                campaign = %campaign.id,
                iteration = index,
                version = document.version(),
                scenarios = scenarios.len(),
                "collecting"
            );
            let pass = self
                .harness
                .run_pass(&document, &scenarios, &self.cancel.token())
                .await;

            // Evaluating
            self.machine.advance(CampaignState::Evaluating)?;
            let PassResult { transcripts, aborted } = pass;
            let evaluation = self.evaluate(&document, &scenarios, &transcripts).await;
            let recurrence = self.guard.observe(evaluation.violations.iter(), document.version());

            let mut iteration = Iteration {
                index,
                version: document.version(),
                document_hash: document.content_hash(),
                transcripts,
                decisions: evaluation.decisions,
                novel_signatures: evaluation.novel,
                aborted,
                outcome: IterationOutcome::Continue,
                started_at,
                finished_at: Utc::now(),
            };
            let tally = iteration.tally();
            tracing::info!(
                campaign = %campaign.id,
                iteration = index,
                compliant = tally.compliant,
                violation = tally.violation,
                ambiguous = tally.ambiguous,
                aborted = tally.aborted,
                novel = iteration.novel_signatures.len(),
                "pass evaluated"
            );

            let mut verdict = match recurrence {
                Err(RefineError::LoopholeRecurrence {
                    signature,
                    first_countered_in,
                    recurred_at,
                }) => Verdict::Abandon(AbandonReason::LoopholeRecurrence {
                    signature,
                    first_countered_in,
                    recurred_at,
                }),
                Err(other) => return Err(other.into()),
                Ok(()) if tally.violation == 0 && iteration.novel_signatures.is_empty() => {
                    if tally.all_compliant() {
                        Verdict::Bulletproof
                    } else {
                        Verdict::Repeat
                    }
                }
                Ok(()) => Verdict::Refine(evaluation.findings),
            };
            if matches!(verdict, Verdict::Repeat | Verdict::Refine(_)) && index + 1 >= self.config.max_iterations {
                verdict = Verdict::Abandon(AbandonReason::IterationCapExceeded {
                    cap: self.config.max_iterations,
                });
            }

            match verdict {
                Verdict::Bulletproof => {
                    self.machine.advance(CampaignState::Bulletproof)?;
                    iteration.outcome = IterationOutcome::Bulletproof;
                    self.record(&mut campaign, iteration).await?;
                    return self.finish(campaign).await;
                }
                Verdict::Abandon(reason) => {
                    self.machine.advance(CampaignState::Abandoned)?;
                    iteration.outcome = IterationOutcome::Abandoned;
                    self.record(&mut campaign, iteration).await?;
                    return self.abandon(campaign, &document, reason).await;
                }
                Verdict::Repeat => {
                    tracing::info!(campaign = %campaign.id, version = document.version(), "unresolved runs; repeating version");
                    self.record(&mut campaign, iteration).await?;
                    self.machine.advance(CampaignState::Collecting)?;
                }
                Verdict::Refine(findings) => {
                    self.machine.advance(CampaignState::Refining)?;
                    match self.engine.refine(&document, &findings) {
                        Ok(next) => {
                            document = self.versions.publish(next).await?;
                            self.guard.track(&document);
                        }
                        Err(RefineError::NothingToCounter { version }) => {
                            tracing::info!(campaign = %campaign.id, version, "findings already countered; repeating version");
                        }
                        Err(e) => return Err(e.into()),
                    }
                    self.record(&mut campaign, iteration).await?;
                    self.machine.advance(CampaignState::Collecting)?;
                }
            }

            if self.cancel.is_cancelled() {
                tracing::warn!(campaign = %campaign.id, iterations = campaign.iterations.len(), "campaign cancelled");
                return Err(CampaignError::Cancelled(Box::new(campaign)));
            }
        }
    }

    /// Active scenarios, plus any aborted last pass that are still in the
    /// catalog and not retired
    fn schedule(&self, campaign: &Campaign) -> Vec<Arc<Scenario>> {
        let mut scenarios = self.catalog.list_active(self.config.min_pressure_count);
        if let Some(latest) = campaign.latest() {
            for id in &latest.aborted {
                if scenarios.iter().any(|s| s.id() == id) || self.catalog.is_retired(id) {
                    continue;
                }
                if let Some(scenario) = self.catalog.get(id) {
                    scenarios.push(scenario);
                }
            }
        }
        scenarios
    }

    async fn evaluate(
        &mut self,
        document: &SkillDocument,
        scenarios: &[Arc<Scenario>],
        transcripts: &[crucible_model::Transcript],
    ) -> Evaluation {
        let by_id: HashMap<&ScenarioId, &Arc<Scenario>> = scenarios.iter().map(|s| (s.id(), s)).collect();

        let mut decisions = Vec::with_capacity(transcripts.len());
        for transcript in transcripts {
            let Some(scenario) = by_id.get(&transcript.scenario_id) else {
                continue;
            };
            let mut decision = self.classifier.classify(transcript, scenario);
            if decision.is_ambiguous() {
                if let Some(verdict) = self.reviewer.review(scenario, transcript, &decision).await {
                    tracing::info!(
                        scenario = %transcript.scenario_id,
                        classification = ?verdict.classification,
                        "human override accepted"
                    );
                    decision = Decision {
                        scenario_id: transcript.scenario_id.clone(),
                        ..verdict
                    }
                    .from_human();
                }
            }
            decisions.push(decision);
        }

        let mut evaluation = Evaluation::default();
        let mut findings: IndexMap<Signature, Finding> = IndexMap::new();
        for decision in &mut decisions {
            let Some(candidate) = decision.rationalization.clone() else {
                continue;
            };
            let (signature, is_novel) = self.registry.lookup_or_register(&candidate);
            decision.signature = Some(signature.clone());
            if is_novel && !evaluation.novel.contains(&signature) {
                evaluation.novel.push(signature.clone());
            }
            if decision.is_violation() {
                evaluation.violations.push(signature.clone());
            }
            if is_novel || (decision.is_violation() && !document.counters(signature.as_str())) {
                let pressures = by_id
                    .get(&decision.scenario_id)
                    .map(|s| s.pressures().clone())
                    .unwrap_or_default();
                findings
                    .entry(signature.clone())
                    .or_insert_with(|| Finding::new(signature, candidate))
                    .pressures
                    .extend(pressures);
            }
        }
        evaluation.decisions = decisions;
        evaluation.findings = findings.into_values().collect();
        evaluation
    }

    async fn record(&self, campaign: &mut Campaign, iteration: Iteration) -> Result<(), CampaignError> {
        self.store.put_iteration(campaign.id, &iteration).await?;
        campaign.iterations.push(iteration);
        Ok(())
    }

    async fn finish(&mut self, mut campaign: Campaign) -> Result<Campaign, CampaignError> {
        let frozen = self.versions.freeze(&campaign.skill)?;
        campaign.status = CampaignStatus::Bulletproof {
            final_version: frozen.version(),
        };
        self.store.put_campaign(&campaign).await?;
        self.export(&campaign, &frozen).await?;
        tracing::info!(
            campaign = %campaign.id,
            skill = %campaign.skill,
            final_version = frozen.version(),
            iterations = campaign.iterations.len(),
            "campaign bulletproof"
        );
        Ok(campaign)
    }

    async fn abandon(
        &mut self,
        mut campaign: Campaign,
        document: &SkillDocument,
        reason: AbandonReason,
    ) -> Result<Campaign, CampaignError> {
        if self.machine.state() != CampaignState::Abandoned {
            self.machine.advance(CampaignState::Abandoned)?;
        }
        let mut unresolved = campaign
            .latest()
            .map(|i| violation_signatures(&i.decisions))
            .unwrap_or_default();
        if let AbandonReason::LoopholeRecurrence { signature, .. } = &reason {
            if !unresolved.contains(signature) {
                unresolved.insert(0, signature.clone());
            }
        }
        let last_stable_version = campaign
            .iterations
            .iter()
            .rev()
            .find(|i| i.tally().violation == 0)
            .or_else(|| campaign.latest())
            .map_or(document.version(), |i| i.version);

        tracing::warn!(
            campaign = %campaign.id,
            skill = %campaign.skill,
            %reason,
            last_stable_version,
            unresolved = unresolved.len(),
            "campaign abandoned"
        );
        campaign.status = CampaignStatus::Abandoned(Abandonment {
            reason,
            unresolved_signatures: unresolved,
            last_stable_version,
        });
        self.store.put_campaign(&campaign).await?;
        self.reviewer.notify_abandoned(&campaign).await;
        self.export(&campaign, document).await?;
        Ok(campaign)
    }

    async fn export(&self, campaign: &Campaign, document: &SkillDocument) -> Result<(), CampaignError> {
        if let Some(path) = &self.config.report_path {
            CampaignReport::build(campaign, document, &self.registry)?.export(path).await?;
        }
        Ok(())
    }
}

/// Distinct signatures of Violation decisions, in order of appearance
fn violation_signatures(decisions: &[Decision]) -> Vec<Signature> {
    let mut signatures = Vec::new();
    for signature in decisions
        .iter()
        .filter(|d| d.is_violation())
        .filter_map(|d| d.signature.as_ref())
    {
        if !signatures.contains(signature) {
            signatures.push(signature.clone());
        }
    }
    signatures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviewer::MockHumanReviewer;
    use crate::runtime::RuntimeError;
    use async_trait::async_trait;
    use crucible_model::{Classification, DecisionSource, Pressure, ScenarioOption};
    use crucible_store::MemoryStore;

    /// Answers every scenario with the same text
    #[derive(Debug)]
    struct Always(&'static str);

    #[async_trait]
    impl AgentRuntime for Always {
        async fn evaluate(&self, _document: String, _scenario: String) -> Result<String, RuntimeError> {
            Ok(self.0.to_string())
        }
    }

    async fn setup(
        agent: Arc<dyn AgentRuntime>,
        config: CampaignConfig,
    ) -> (CampaignOrchestrator, Arc<dyn PersistentStore>) {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(ScenarioCatalog::new(store.clone()));
        catalog
            .add(
                Scenario::new(
                    "s1",
                    "The release is due.",
                    [Pressure::Time],
                    vec![
                        ScenarioOption::new("A", "Write the test first"),
                        ScenarioOption::new("B", "Ship without tests"),
                    ],
                    "A",
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let versions = Arc::new(SkillVersionStore::new(store.clone()));
        versions
            .init(SkillDocument::draft(SkillId::new("tdd"), "Use when writing code").with_rule("Test first."))
            .await
            .unwrap();
        let orchestrator = CampaignOrchestrator::new(config, store.clone(), catalog, versions, agent).unwrap();
        (orchestrator, store)
    }

    #[tokio::test]
    async fn human_override_resolves_ambiguity() {
        let mut reviewer = MockHumanReviewer::new();
        reviewer
            .expect_review()
            .times(1)
            .returning(|scenario, _, _| Some(Decision::compliant(scenario.id().clone(), "A")));
        reviewer.expect_notify_abandoned().never();

        let (orchestrator, _) = setup(Arc::new(Always("Hard to say.")), CampaignConfig::default()).await;
        let mut orchestrator = orchestrator.with_reviewer(Arc::new(reviewer));
        let campaign = orchestrator.run(&SkillId::new("tdd")).await.unwrap();

        assert!(campaign.is_bulletproof());
        let decision = &campaign.iterations[0].decisions[0];
        assert_eq!(decision.classification, Classification::Compliant);
        assert_eq!(decision.source, DecisionSource::Human);
        assert_eq!(orchestrator.state(), CampaignState::Bulletproof);
    }

    #[tokio::test]
    async fn unresolved_ambiguity_hits_the_cap() {
        let mut reviewer = MockHumanReviewer::new();
        reviewer.expect_review().returning(|_, _, _| None);
        reviewer.expect_notify_abandoned().times(1).return_const(());

        let config = CampaignConfig::default().with_max_iterations(3);
        let (orchestrator, store) = setup(Arc::new(Always("Hard to say.")), config).await;
        let mut orchestrator = orchestrator.with_reviewer(Arc::new(reviewer));
        let campaign = orchestrator.run(&SkillId::new("tdd")).await.unwrap();

        let abandonment = campaign.abandonment().unwrap();
        assert_eq!(abandonment.reason, AbandonReason::IterationCapExceeded { cap: 3 });
        assert_eq!(abandonment.last_stable_version, 0);
        assert_eq!(campaign.iterations.len(), 3);
        assert!(campaign.iterations.iter().all(|i| i.version == 0));
        assert_eq!(campaign.iterations[2].outcome, IterationOutcome::Abandoned);
        assert_eq!(store.iterations(campaign.id).await.unwrap().len(), 3);
        assert!(store.campaign(campaign.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn countered_excuse_recurring_abandons() {
        let config = CampaignConfig::default().with_max_iterations(5);
        let (mut orchestrator, _) =
            setup(Arc::new(Always("I'll go with B because nobody reads the tests.")), config).await;
        let campaign = orchestrator.run(&SkillId::new("tdd")).await.unwrap();

        // v0 violates and is refined; v1 sees the countered excuse again.
        let abandonment = campaign.abandonment().unwrap();
        assert!(matches!(
            &abandonment.reason,
            AbandonReason::LoopholeRecurrence { first_countered_in: 1, recurred_at: 1, .. }
        ));
        assert_eq!(campaign.iterations.len(), 2);
        assert_eq!(abandonment.unresolved_signatures.len(), 1);
    }

    #[tokio::test]
    async fn empty_catalog_fails_fast() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(ScenarioCatalog::new(store.clone()));
        let versions = Arc::new(SkillVersionStore::new(store.clone()));
        versions
            .init(SkillDocument::draft(SkillId::new("tdd"), "d").with_rule("r"))
            .await
            .unwrap();
        let mut orchestrator =
            CampaignOrchestrator::new(CampaignConfig::default(), store, catalog, versions, Arc::new(Always("A")))
                .unwrap();
        assert!(matches!(
            orchestrator.run(&SkillId::new("tdd")).await,
            Err(CampaignError::EmptyScenarioSet)
        ));
    }

    #[tokio::test]
    async fn earlier_cancellation_does_not_stop_a_new_campaign() {
        let (mut orchestrator, _) = setup(Arc::new(Always("I choose A.")), CampaignConfig::default()).await;
        orchestrator.cancel_handle().cancel();

        let campaign = orchestrator.run(&SkillId::new("tdd")).await.unwrap();

        assert!(campaign.is_bulletproof());
        assert_eq!(campaign.iterations[0].tally().aborted, 0);
    }

    #[tokio::test]
    async fn resume_rejects_terminal_campaign() {
        let (mut orchestrator, _) = setup(Arc::new(Always("I choose A.")), CampaignConfig::default()).await;
        let campaign = orchestrator.run(&SkillId::new("tdd")).await.unwrap();
        assert!(campaign.is_bulletproof());
        assert!(matches!(
            orchestrator.resume(campaign).await,
            Err(CampaignError::AlreadyTerminal(_))
        ));
    }

    #[test]
    fn violation_signatures_are_distinct() {
        let sig = Signature::new("deadline");
        let mut a = Decision::violation(ScenarioId::new("a"), Some("B".into()), "given the deadline");
        a.signature = Some(sig.clone());
        let b = a.clone();
        let c = Decision::compliant(ScenarioId::new("c"), "A");
        assert_eq!(violation_signatures(&[a, b, c]), vec![sig]);
    }
}
