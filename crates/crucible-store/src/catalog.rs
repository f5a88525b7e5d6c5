//! Scenario catalog
//!
//! Accepted scenarios are never mutated. Retirement is a separate record,
//! so history stays readable and a retired scenario can still be looked up
//! by id from an old campaign report.

use crate::error::StoreError;
use crate::persist::{PersistentStore, RecordKind, Retirement};
use chrono::{DateTime, Utc};
use crucible_model::{Scenario, ScenarioId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CatalogEntry {
    scenario: Arc<Scenario>,
    seq: u64,
    retired_at: Option<DateTime<Utc>>,
}

/// Catalog of decision scenarios
pub struct ScenarioCatalog {
    store: Arc<dyn PersistentStore>,
    entries: DashMap<ScenarioId, CatalogEntry>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for ScenarioCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioCatalog")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ScenarioCatalog {
    /// Empty catalog writing through to `store`
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Rebuild a catalog from everything `store` holds
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn load(store: Arc<dyn PersistentStore>) -> Result<Self, StoreError> {
        let catalog = Self::new(store.clone());
        for scenario in store.scenarios().await? {
            catalog.insert_entry(Arc::new(scenario));
        }
        for retirement in store.retirements().await? {
            if let Some(mut entry) = catalog.entries.get_mut(&retirement.scenario_id) {
                entry.retired_at = Some(retirement.retired_at);
            }
        }
        tracing::debug!(scenarios = catalog.entries.len(), "scenario catalog loaded");
        Ok(catalog)
    }

    fn insert_entry(&self, scenario: Arc<Scenario>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            scenario.id().clone(),
            CatalogEntry {
                scenario,
                seq,
                retired_at: None,
            },
        );
    }

    /// Accept a validated scenario
    ///
    /// # Errors
    /// - `StoreError::DuplicateScenario` if the id was accepted before
    /// - backend failures from the store
    pub async fn add(&self, scenario: Scenario) -> Result<Arc<Scenario>, StoreError> {
        if self.entries.contains_key(scenario.id()) {
            return Err(StoreError::DuplicateScenario(scenario.id().to_string()));
        }
        // The store's create-only write settles races between concurrent adds.
        match self.store.put_scenario(&scenario).await {
            Err(StoreError::AlreadyExists {
                kind: RecordKind::Scenario,
                ..
            }) => return Err(StoreError::DuplicateScenario(scenario.id().to_string())),
            other => other?,
        }
        let scenario = Arc::new(scenario);
        self.insert_entry(scenario.clone());
        tracing::info!(scenario = %scenario.id(), pressures = scenario.pressure_count(), "scenario added");
        Ok(scenario)
    }

    /// Active scenarios carrying at least `min_pressure_count` pressures, in
    /// the order they were added
    #[must_use]
    pub fn list_active(&self, min_pressure_count: usize) -> Vec<Arc<Scenario>> {
        let mut active: Vec<(u64, Arc<Scenario>)> = self
            .entries
            .iter()
            .filter(|e| e.retired_at.is_none() && e.scenario.pressure_count() >= min_pressure_count)
            .map(|e| (e.seq, e.scenario.clone()))
            .collect();
        active.sort_by_key(|(seq, _)| *seq);
        active.into_iter().map(|(_, s)| s).collect()
    }

    /// Soft-remove a scenario; retiring twice is a no-op
    ///
    /// # Errors
    /// `StoreError::UnknownScenario` if the id was never accepted.
    pub async fn retire(&self, id: &ScenarioId) -> Result<(), StoreError> {
        let already = match self.entries.get(id) {
            None => return Err(StoreError::UnknownScenario(id.to_string())),
            Some(entry) => entry.retired_at.is_some(),
        };
        if already {
            return Ok(());
        }
        let retirement = Retirement {
            scenario_id: id.clone(),
            retired_at: Utc::now(),
        };
        match self.store.put_retirement(&retirement).await {
            Err(StoreError::AlreadyExists { .. }) | Ok(()) => {}
            Err(e) => return Err(e),
        }
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.retired_at.get_or_insert(retirement.retired_at);
        }
        tracing::info!(scenario = %id, "scenario retired");
        Ok(())
    }

    /// Look up any accepted scenario, retired or not
    #[must_use]
    pub fn get(&self, id: &ScenarioId) -> Option<Arc<Scenario>> {
        self.entries.get(id).map(|e| e.scenario.clone())
    }

    #[must_use]
    pub fn is_retired(&self, id: &ScenarioId) -> bool {
        self.entries.get(id).is_some_and(|e| e.retired_at.is_some())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use crucible_model::{Pressure, ScenarioOption};

    fn scenario(id: &str, pressures: &[Pressure]) -> Scenario {
        Scenario::new(
            id,
            "Production is down.",
            pressures.iter().copied(),
            vec![
                ScenarioOption::new("A", "Investigate root cause"),
                ScenarioOption::new("B", "Apply the quick fix"),
            ],
            "A",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn add_rejects_duplicates() {
        let catalog = ScenarioCatalog::new(Arc::new(MemoryStore::new()));
        catalog.add(scenario("s1", &[Pressure::Time])).await.unwrap();
        let err = catalog.add(scenario("s1", &[Pressure::Time])).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateScenario(id) if id == "s1"));
    }

    #[tokio::test]
    async fn list_active_filters_by_pressure_and_keeps_order() {
        let catalog = ScenarioCatalog::new(Arc::new(MemoryStore::new()));
        catalog.add(scenario("three", &[Pressure::Time, Pressure::Authority, Pressure::Economic])).await.unwrap();
        catalog.add(scenario("one", &[Pressure::Time])).await.unwrap();
        catalog.add(scenario("two", &[Pressure::SunkCost, Pressure::Exhaustion])).await.unwrap();

        let ids: Vec<String> = catalog
            .list_active(2)
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["three", "two"]);
        assert_eq!(catalog.list_active(0).len(), 3);
    }

    #[tokio::test]
    async fn retire_is_soft_and_survives_reload() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let catalog = ScenarioCatalog::new(store.clone());
        catalog.add(scenario("s1", &[Pressure::Time])).await.unwrap();
        catalog.add(scenario("s2", &[Pressure::Time])).await.unwrap();

        catalog.retire(&ScenarioId::new("s1")).await.unwrap();
        catalog.retire(&ScenarioId::new("s1")).await.unwrap();
        assert_eq!(catalog.list_active(0).len(), 1);
        assert!(catalog.get(&ScenarioId::new("s1")).is_some());

        let reloaded = ScenarioCatalog::load(store).await.unwrap();
        assert!(reloaded.is_retired(&ScenarioId::new("s1")));
        assert_eq!(reloaded.list_active(0).len(), 1);
    }

    #[tokio::test]
    async fn retire_unknown_fails() {
        let catalog = ScenarioCatalog::new(Arc::new(MemoryStore::new()));
        let err = catalog.retire(&ScenarioId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownScenario(_)));
    }
}
