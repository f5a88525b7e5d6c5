//! Testing utilities for the Crucible workspace
//!
//! Scripted collaborators and fixtures for campaign tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use crucible_campaign::{
    AgentRuntime, CampaignConfig, CampaignError, CampaignOrchestrator, HumanReviewer, RuntimeError,
};
use crucible_model::{
    Campaign, Decision, Pressure, Scenario, ScenarioId, ScenarioOption, SkillDocument, SkillId, Transcript,
};
use crucible_store::{MemoryStore, PersistentStore, ScenarioCatalog, SkillVersionStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a [`ScriptedAgent`] answers one run
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(String),
    /// Reply after a delay on the tokio clock
    Delay(Duration, String),
    /// Never answer
    Hang,
    Fail(String),
    /// Blank output
    Empty,
    /// Branch on the document text the run was given
    ByDocument {
        contains: String,
        then: Box<Behavior>,
        otherwise: Box<Behavior>,
    },
    /// One behavior per call, repeating the last once exhausted
    Sequence(Vec<Behavior>),
}

impl Behavior {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply(text.into())
    }

    pub fn when_document_contains(contains: impl Into<String>, then: Behavior, otherwise: Behavior) -> Self {
        Self::ByDocument {
            contains: contains.into(),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }
}

/// Agent runtime with canned behavior keyed by scenario
#[derive(Debug)]
pub struct ScriptedAgent {
    rules: Vec<(String, Behavior)>,
    fallback: Behavior,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    per_rule: Mutex<HashMap<usize, usize>>,
    received: Mutex<Vec<(String, String)>>,
}

impl ScriptedAgent {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            per_rule: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Answer runs whose scenario text contains `needle`
    #[must_use]
    pub fn on(mut self, needle: impl Into<String>, behavior: Behavior) -> Self {
        self.rules.push((needle.into(), behavior));
        self
    }

    /// Answer runs of the fixture scenario `id`
    #[must_use]
    pub fn on_scenario(self, id: &str, behavior: Behavior) -> Self {
        self.on(scenario_marker(id), behavior)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// (document, scenario) texts of every run, in arrival order
    pub fn received(&self) -> Vec<(String, String)> {
        self.received.lock().clone()
    }

    fn pick(&self, scenario_text: &str) -> Behavior {
        let Some(index) = self.rules.iter().position(|(needle, _)| scenario_text.contains(needle)) else {
            return self.fallback.clone();
        };
        let mut counts = self.per_rule.lock();
        let call = counts.entry(index).or_insert(0);
        let behavior = sequence_step(&self.rules[index].1, *call);
        *call += 1;
        behavior
    }
}

fn sequence_step(behavior: &Behavior, call: usize) -> Behavior {
    match behavior {
        Behavior::Sequence(steps) if !steps.is_empty() => steps[call.min(steps.len() - 1)].clone(),
        other => other.clone(),
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    async fn evaluate(&self, document_text: String, scenario_text: String) -> Result<String, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut behavior = self.pick(&scenario_text);
        self.received.lock().push((document_text.clone(), scenario_text));
        loop {
            match behavior {
                Behavior::Reply(text) => return Ok(text),
                Behavior::Delay(wait, text) => {
                    tokio::time::sleep(wait).await;
                    return Ok(text);
                }
                Behavior::Hang => return std::future::pending().await,
                Behavior::Fail(message) => return Err(RuntimeError::Unavailable(message)),
                Behavior::Empty => return Ok(String::new()),
                Behavior::ByDocument {
                    contains,
                    then,
                    otherwise,
                } => {
                    behavior = if document_text.contains(&contains) { *then } else { *otherwise };
                }
                Behavior::Sequence(steps) => {
                    behavior = steps.last().cloned().unwrap_or(Behavior::Empty);
                }
            }
        }
    }
}

/// Reviewer that answers from a fixed table and counts hand-overs
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    overrides: HashMap<ScenarioId, Decision>,
    reviewed: AtomicUsize,
    abandoned: Mutex<Vec<Campaign>>,
}

impl ScriptedReviewer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_override(mut self, decision: Decision) -> Self {
        self.overrides.insert(decision.scenario_id.clone(), decision);
        self
    }

    pub fn reviewed(&self) -> usize {
        self.reviewed.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> Vec<Campaign> {
        self.abandoned.lock().clone()
    }
}

#[async_trait]
impl HumanReviewer for ScriptedReviewer {
    async fn review(&self, scenario: &Scenario, _transcript: &Transcript, _decision: &Decision) -> Option<Decision> {
        self.reviewed.fetch_add(1, Ordering::SeqCst);
        self.overrides.get(scenario.id()).cloned()
    }

    async fn notify_abandoned(&self, campaign: &Campaign) {
        self.abandoned.lock().push(campaign.clone());
    }
}

/// Text every fixture scenario carries so agents can tell them apart
pub fn scenario_marker(id: &str) -> String {
    format!("[case {id}]")
}

/// Three-option TDD scenario; "A" is compliant
pub fn scenario(id: &str, pressures: impl IntoIterator<Item = Pressure>) -> Scenario {
    Scenario::new(
        id,
        format!(
            "{} You wrote the feature without a failing test first and it works.",
            scenario_marker(id)
        ),
        pressures,
        vec![
            ScenarioOption::new("A", "Delete the code and start over with a failing test"),
            ScenarioOption::new("B", "Keep the code and write tests afterwards"),
            ScenarioOption::new("C", "Ship now without tests"),
        ],
        "A",
    )
    .expect("fixture scenario is valid")
}

pub fn skill() -> SkillId {
    SkillId::new("test-driven-development")
}

pub fn draft_document() -> SkillDocument {
    SkillDocument::draft(skill(), "Use when implementing any feature or bugfix")
        .with_rule("Write the failing test before the implementation.")
        .with_rule("Code written before its test is deleted.")
}

/// Stores, catalog and an initialized version chain
pub struct Fixture {
    pub store: Arc<dyn PersistentStore>,
    pub catalog: Arc<ScenarioCatalog>,
    pub versions: Arc<SkillVersionStore>,
}

impl Fixture {
    /// Catalog holding `scenarios` and a chain starting at [`draft_document`]
    pub async fn new(scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(ScenarioCatalog::new(store.clone()));
        for scenario in scenarios {
            catalog.add(scenario).await.expect("fixture scenario added");
        }
        let versions = Arc::new(SkillVersionStore::new(store.clone()));
        versions.init(draft_document()).await.expect("draft initialized");
        Self {
            store,
            catalog,
            versions,
        }
    }

    pub fn orchestrator(
        &self,
        config: CampaignConfig,
        agent: Arc<dyn AgentRuntime>,
    ) -> Result<CampaignOrchestrator, CampaignError> {
        CampaignOrchestrator::new(
            config,
            self.store.clone(),
            self.catalog.clone(),
            self.versions.clone(),
            agent,
        )
    }
}
