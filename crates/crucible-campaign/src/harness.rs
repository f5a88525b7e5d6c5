//! Execution harness
//!
//! Dispatches (version, scenario) runs to the agent runtime:
//!
//! - each run gets owned copies of the document and scenario text only
//! - a semaphore bounds how many runs are in flight
//! - every run has its own deadline; a hung run ends as `TimedOut` without
//!   holding up its siblings
//! - results land in an append-only [`ResultCollector`]
//! - [`ExecutionHarness::run_pass`] returns only after every run completed,
//!   timed out or was aborted
//!
//! Runs are never retried automatically.

use crate::runtime::AgentRuntime;
use crucible_classify::explicit_selection;
use crucible_model::{RunError, Scenario, ScenarioId, SkillDocument, Transcript};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;

/// Campaign-level cancellation switch
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Abort in-flight runs and stop after the current pass is recorded
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Clear a previous cancellation so the campaign can resume
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of a [`CancelHandle`]
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; never if the handle is gone
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// How one scheduled run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Transcript),
    Aborted(ScenarioId),
}

/// Append-only, concurrently writable result sink for one pass
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    entries: Arc<Mutex<Vec<(usize, RunOutcome)>>>,
}

impl ResultCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of the run scheduled in `slot`
    pub fn push(&self, slot: usize, outcome: RunOutcome) {
        self.entries.lock().push((slot, outcome));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drain into a pass result ordered by schedule slot
    #[must_use]
    pub fn finish(&self) -> PassResult {
        let mut entries = std::mem::take(&mut *self.entries.lock());
        entries.sort_by_key(|(slot, _)| *slot);
        let mut pass = PassResult::default();
        for (_, outcome) in entries {
            match outcome {
                RunOutcome::Completed(transcript) => pass.transcripts.push(transcript),
                RunOutcome::Aborted(id) => pass.aborted.push(id),
            }
        }
        pass
    }
}

/// Everything one pass produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassResult {
    pub transcripts: Vec<Transcript>,
    pub aborted: Vec<ScenarioId>,
}

/// Runs scenarios against document versions through the agent runtime
#[derive(Clone)]
pub struct ExecutionHarness {
    runtime: Arc<dyn AgentRuntime>,
    deadline: Duration,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for ExecutionHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHarness")
            .field("deadline", &self.deadline)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl ExecutionHarness {
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>, deadline: Duration, max_concurrent_runs: usize) -> Self {
        Self {
            runtime,
            deadline,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run one scenario against one version
    pub async fn run(&self, document: &SkillDocument, scenario: &Scenario) -> Transcript {
        let _permit = self.permits.acquire().await.ok();
        execute(
            self.runtime.clone(),
            self.deadline,
            document.version(),
            document.render_markdown(),
            scenario,
        )
        .await
    }

    /// Run every scenario against `document` on the worker pool
    ///
    /// Returns after all runs have completed, timed out or been aborted by
    /// `cancel`. Aborted scenarios are listed separately and have no
    /// transcript.
    pub async fn run_pass(
        &self,
        document: &SkillDocument,
        scenarios: &[Arc<Scenario>],
        cancel: &CancelToken,
    ) -> PassResult {
        let version = document.version();
        let document_text: Arc<str> = document.render_markdown().into();
        let collector = ResultCollector::new();

        let handles: Vec<_> = scenarios
            .iter()
            .enumerate()
            .map(|(slot, scenario)| {
                let runtime = self.runtime.clone();
                let permits = self.permits.clone();
                let deadline = self.deadline;
                let collector = collector.clone();
                let document_text = document_text.clone();
                let scenario = scenario.clone();
                let mut cancel = cancel.clone();
                tokio::spawn(async move {
                    let run = async {
                        let _permit = permits.acquire_owned().await.ok()?;
                        Some(execute(runtime, deadline, version, document_text.to_string(), &scenario).await)
                    };
                    let outcome = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        transcript = run => transcript,
                    };
                    match outcome {
                        Some(transcript) => collector.push(slot, RunOutcome::Completed(transcript)),
                        None => {
                            tracing::debug!(scenario = %scenario.id(), version, "run aborted");
                            collector.push(slot, RunOutcome::Aborted(scenario.id().clone()));
                        }
                    }
                })
            })
            .collect();

        for (slot, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                tracing::warn!(scenario = %scenarios[slot].id(), error = %e, "run task failed");
                collector.push(
                    slot,
                    RunOutcome::Completed(Transcript::failed(
                        scenarios[slot].id().clone(),
                        version,
                        RunError::RuntimeUnavailable {
                            message: format!("run task failed: {e}"),
                        },
                        0,
                    )),
                );
            }
        }

        let pass = collector.finish();
        tracing::debug!(
            version,
            completed = pass.transcripts.len(),
            aborted = pass.aborted.len(),
            "pass collected"
        );
        pass
    }
}

async fn execute(
    runtime: Arc<dyn AgentRuntime>,
    deadline: Duration,
    version: u32,
    document_text: String,
    scenario: &Scenario,
) -> Transcript {
    let started = Instant::now();
    let result = tokio::time::timeout(deadline, runtime.evaluate(document_text, scenario.render_prompt())).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let id = scenario.id().clone();

    match result {
        Err(_) => {
            tracing::warn!(scenario = %id, version, deadline_secs = deadline.as_secs_f64(), "run timed out");
            Transcript::failed(id, version, RunError::TimedOut, elapsed_ms)
        }
        Ok(Err(e)) => {
            tracing::warn!(scenario = %id, version, error = %e, "agent runtime failed");
            Transcript::failed(
                id,
                version,
                RunError::RuntimeUnavailable { message: e.to_string() },
                elapsed_ms,
            )
        }
        Ok(Ok(output)) if output.trim().is_empty() => {
            tracing::warn!(scenario = %id, version, "agent returned no output");
            Transcript::failed(id, version, RunError::Unparseable, elapsed_ms)
        }
        Ok(Ok(output)) => {
            tracing::debug!(scenario = %id, version, elapsed_ms, "run completed");
            Transcript {
                chosen_option: explicit_selection(&output, scenario),
                scenario_id: id,
                skill_version: version,
                raw_output: output,
                error: None,
                elapsed_ms,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeError;
    use async_trait::async_trait;
    use crucible_model::{Pressure, ScenarioOption, SkillId};

    #[derive(Debug)]
    struct Fixed(&'static str);

    #[async_trait]
    impl AgentRuntime for Fixed {
        async fn evaluate(&self, _document: String, _scenario: String) -> Result<String, RuntimeError> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Debug)]
    struct Hang;

    #[async_trait]
    impl AgentRuntime for Hang {
        async fn evaluate(&self, _document: String, _scenario: String) -> Result<String, RuntimeError> {
            std::future::pending().await
        }
    }

    fn document() -> SkillDocument {
        SkillDocument::draft(SkillId::new("tdd"), "Use when writing code").with_rule("Test first.")
    }

    fn scenario(id: &str) -> Arc<Scenario> {
        Arc::new(
            Scenario::new(
                id,
                "Ship or test?",
                [Pressure::Time],
                vec![ScenarioOption::new("A", "Test"), ScenarioOption::new("B", "Ship")],
                "A",
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn run_records_explicit_choice() {
        let harness = ExecutionHarness::new(Arc::new(Fixed("I choose B.")), Duration::from_secs(5), 2);
        let transcript = harness.run(&document(), &scenario("s1")).await;
        assert_eq!(transcript.chosen_option.as_deref(), Some("B"));
        assert_eq!(transcript.skill_version, 0);
        assert!(!transcript.is_error());
    }

    #[tokio::test]
    async fn blank_output_is_unparseable() {
        let harness = ExecutionHarness::new(Arc::new(Fixed("  \n")), Duration::from_secs(5), 2);
        let transcript = harness.run(&document(), &scenario("s1")).await;
        assert_eq!(transcript.error, Some(RunError::Unparseable));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_run_times_out() {
        let harness = ExecutionHarness::new(Arc::new(Hang), Duration::from_secs(30), 2);
        let transcript = harness.run(&document(), &scenario("s1")).await;
        assert_eq!(transcript.error, Some(RunError::TimedOut));
        assert!(transcript.elapsed_ms >= 30_000);
    }

    #[tokio::test]
    async fn pass_keeps_schedule_order() {
        let harness = ExecutionHarness::new(Arc::new(Fixed("I choose A.")), Duration::from_secs(5), 3);
        let scenarios: Vec<_> = ["s1", "s2", "s3", "s4"].into_iter().map(scenario).collect();
        let pass = harness
            .run_pass(&document(), &scenarios, &CancelHandle::new().token())
            .await;
        let ids: Vec<&str> = pass.transcripts.iter().map(|t| t.scenario_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3", "s4"]);
        assert!(pass.aborted.is_empty());
    }

    #[tokio::test]
    async fn cancelled_pass_aborts_every_run() {
        let harness = ExecutionHarness::new(Arc::new(Hang), Duration::from_secs(3600), 2);
        let cancel = CancelHandle::new();
        cancel.cancel();
        let pass = harness
            .run_pass(&document(), &[scenario("s1"), scenario("s2")], &cancel.token())
            .await;
        assert!(pass.transcripts.is_empty());
        assert_eq!(pass.aborted.len(), 2);
    }

    #[test]
    fn collector_sorts_by_slot() {
        let collector = ResultCollector::new();
        collector.push(1, RunOutcome::Aborted(ScenarioId::new("b")));
        collector.push(0, RunOutcome::Aborted(ScenarioId::new("a")));
        assert_eq!(collector.len(), 2);
        let pass = collector.finish();
        assert_eq!(pass.aborted, vec![ScenarioId::new("a"), ScenarioId::new("b")]);
        assert!(collector.is_empty());
    }
}
