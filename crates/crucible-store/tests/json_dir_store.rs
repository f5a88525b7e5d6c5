//! Catalog and version chains reopened from a JSON directory

use crucible_model::{Augmentation, Pressure, Scenario, ScenarioId, ScenarioOption, SkillDocument, SkillId};
use crucible_store::{JsonDirStore, PersistentStore, ScenarioCatalog, SkillVersionStore, StoreError};
use std::sync::Arc;

fn scenario(id: &str, pressures: &[Pressure]) -> Scenario {
    Scenario::new(
        id,
        "Your lead asks you to skip the review to hit the release.",
        pressures.iter().copied(),
        vec![
            ScenarioOption::new("A", "Hold the release until review is done"),
            ScenarioOption::new("B", "Merge without review"),
        ],
        "A",
    )
    .unwrap()
}

async fn open(dir: &std::path::Path) -> Arc<dyn PersistentStore> {
    Arc::new(JsonDirStore::open(dir).await.unwrap())
}

#[tokio::test]
async fn catalog_and_chain_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let skill = SkillId::new("code-review");

    {
        let store = open(dir.path()).await;
        let catalog = ScenarioCatalog::new(store.clone());
        catalog.add(scenario("lead-says-skip", &[Pressure::Authority, Pressure::Time])).await.unwrap();
        catalog.add(scenario("friday-deploy", &[Pressure::Exhaustion])).await.unwrap();
        catalog.retire(&ScenarioId::new("friday-deploy")).await.unwrap();

        let versions = SkillVersionStore::new(store);
        let v0 = versions
            .init(SkillDocument::draft(skill.clone(), "Use before merging").with_rule("Every change gets a review."))
            .await
            .unwrap();
        let v1 = v0
            .augment(&Augmentation {
                counters: vec![(
                    "authority overrides the rule".into(),
                    "Seniority does not waive review.".into(),
                )],
                ..Augmentation::default()
            })
            .unwrap();
        versions.publish(v1).await.unwrap();
        versions.freeze(&skill).unwrap();
    }

    let store = open(dir.path()).await;
    let catalog = ScenarioCatalog::load(store.clone()).await.unwrap();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.is_retired(&ScenarioId::new("friday-deploy")));
    let active: Vec<_> = catalog.list_active(2).iter().map(|s| s.id().clone()).collect();
    assert_eq!(active, vec![ScenarioId::new("lead-says-skip")]);

    let versions = SkillVersionStore::new(store);
    let head = versions.load(&skill).await.unwrap();
    assert_eq!(head.version(), 1);
    assert!(head.counters("authority overrides the rule"));
    assert!(!versions.is_frozen(&skill), "freeze is not persisted");
}

#[tokio::test]
async fn duplicate_scenario_is_rejected_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let catalog = ScenarioCatalog::new(store.clone());
    catalog.add(scenario("s1", &[Pressure::Social])).await.unwrap();

    let fresh = ScenarioCatalog::new(store);
    let err = fresh.add(scenario("s1", &[Pressure::Social])).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateScenario(_)));
}
