//! Append-only persistence
//!
//! The engine needs only create and read. Both backends enforce that a key
//! is written at most once, so a stored version or iteration can never be
//! overwritten behind a running campaign.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crucible_model::{Campaign, CampaignId, Iteration, Scenario, ScenarioId, SkillDocument, SkillId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Kind of persisted record, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Scenario,
    Retirement,
    Document,
    Iteration,
    Campaign,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Scenario => "scenario",
            RecordKind::Retirement => "retirement",
            RecordKind::Document => "document",
            RecordKind::Iteration => "iteration",
            RecordKind::Campaign => "campaign",
        })
    }
}

/// Soft-removal marker for a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retirement {
    pub scenario_id: ScenarioId,
    pub retired_at: DateTime<Utc>,
}

/// Append-only storage collaborator
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError>;

    async fn put_retirement(&self, retirement: &Retirement) -> Result<(), StoreError>;

    async fn put_document(&self, document: &SkillDocument) -> Result<(), StoreError>;

    async fn put_iteration(&self, campaign: CampaignId, iteration: &Iteration) -> Result<(), StoreError>;

    /// Final campaign record, written once the campaign is terminal
    async fn put_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    async fn scenarios(&self) -> Result<Vec<Scenario>, StoreError>;

    async fn retirements(&self) -> Result<Vec<Retirement>, StoreError>;

    /// Every stored version of `skill`, ascending
    async fn documents(&self, skill: &SkillId) -> Result<Vec<SkillDocument>, StoreError>;

    /// Every stored iteration of `campaign`, ascending
    async fn iterations(&self, campaign: CampaignId) -> Result<Vec<Iteration>, StoreError>;

    async fn campaign(&self, campaign: CampaignId) -> Result<Option<Campaign>, StoreError>;
}

fn insert_once<K, V>(map: &DashMap<K, V>, key: K, value: V, kind: RecordKind) -> Result<(), StoreError>
where
    K: Eq + std::hash::Hash + fmt::Debug,
{
    match map.entry(key) {
        Entry::Occupied(entry) => Err(StoreError::AlreadyExists {
            kind,
            key: format!("{:?}", entry.key()),
        }),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

/// In-process store, the default for tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    scenarios: DashMap<ScenarioId, Scenario>,
    retirements: DashMap<ScenarioId, Retirement>,
    documents: DashMap<(SkillId, u32), SkillDocument>,
    iterations: DashMap<(CampaignId, u32), Iteration>,
    campaigns: DashMap<CampaignId, Campaign>,
}

impl MemoryStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        insert_once(
            &self.scenarios,
            scenario.id().clone(),
            scenario.clone(),
            RecordKind::Scenario,
        )
    }

    async fn put_retirement(&self, retirement: &Retirement) -> Result<(), StoreError> {
        insert_once(
            &self.retirements,
            retirement.scenario_id.clone(),
            retirement.clone(),
            RecordKind::Retirement,
        )
    }

    async fn put_document(&self, document: &SkillDocument) -> Result<(), StoreError> {
        insert_once(
            &self.documents,
            (document.skill().clone(), document.version()),
            document.clone(),
            RecordKind::Document,
        )
    }

    async fn put_iteration(&self, campaign: CampaignId, iteration: &Iteration) -> Result<(), StoreError> {
        insert_once(
            &self.iterations,
            (campaign, iteration.index),
            iteration.clone(),
            RecordKind::Iteration,
        )
    }

    async fn put_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        insert_once(&self.campaigns, campaign.id, campaign.clone(), RecordKind::Campaign)
    }

    async fn scenarios(&self) -> Result<Vec<Scenario>, StoreError> {
        let mut out: Vec<Scenario> = self.scenarios.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(out)
    }

    async fn retirements(&self) -> Result<Vec<Retirement>, StoreError> {
        let mut out: Vec<Retirement> = self.retirements.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.retired_at);
        Ok(out)
    }

    async fn documents(&self, skill: &SkillId) -> Result<Vec<SkillDocument>, StoreError> {
        let mut out: Vec<SkillDocument> = self
            .documents
            .iter()
            .filter(|e| &e.key().0 == skill)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(SkillDocument::version);
        Ok(out)
    }

    async fn iterations(&self, campaign: CampaignId) -> Result<Vec<Iteration>, StoreError> {
        let mut out: Vec<Iteration> = self
            .iterations
            .iter()
            .filter(|e| e.key().0 == campaign)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|i| i.index);
        Ok(out)
    }

    async fn campaign(&self, campaign: CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.campaigns.get(&campaign).map(|e| e.value().clone()))
    }
}

/// One JSON file per record under a root directory
///
/// ```text
/// <root>/scenarios/<id>.json
/// <root>/retirements/<id>.json
/// <root>/documents/<skill>/<version>.json
/// <root>/campaigns/<campaign>/iteration-<index>.json
/// <root>/campaigns/<campaign>/campaign.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Open (creating if needed) a store rooted at `root`
    ///
    /// # Errors
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["scenarios", "retirements", "documents", "campaigns"] {
            tokio::fs::create_dir_all(root.join(sub)).await?;
        }
        Ok(Self { root })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write_once<T: Serialize + Sync>(
        &self,
        path: PathBuf,
        value: &T,
        kind: RecordKind,
    ) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    kind,
                    key: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        tracing::debug!(path = %path.display(), "record written");
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, dir: PathBuf) -> Result<Vec<(String, T)>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let bytes = tokio::fs::read(&path).await?;
            out.push((stem, serde_json::from_slice(&bytes)?));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn campaign_dir(&self, campaign: CampaignId) -> PathBuf {
        self.root.join("campaigns").join(campaign.to_string())
    }
}

/// Map an authored id onto a safe file name
fn file_key(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl PersistentStore for JsonDirStore {
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        let path = self
            .root
            .join("scenarios")
            .join(format!("{}.json", file_key(scenario.id().as_str())));
        self.write_once(path, scenario, RecordKind::Scenario).await
    }

    async fn put_retirement(&self, retirement: &Retirement) -> Result<(), StoreError> {
        let path = self
            .root
            .join("retirements")
            .join(format!("{}.json", file_key(retirement.scenario_id.as_str())));
        self.write_once(path, retirement, RecordKind::Retirement).await
    }

    async fn put_document(&self, document: &SkillDocument) -> Result<(), StoreError> {
        let path = self
            .root
            .join("documents")
            .join(file_key(document.skill().as_str()))
            .join(format!("{:06}.json", document.version()));
        self.write_once(path, document, RecordKind::Document).await
    }

    async fn put_iteration(&self, campaign: CampaignId, iteration: &Iteration) -> Result<(), StoreError> {
        let path = self
            .campaign_dir(campaign)
            .join(format!("iteration-{:04}.json", iteration.index));
        self.write_once(path, iteration, RecordKind::Iteration).await
    }

    async fn put_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let path = self.campaign_dir(campaign.id).join("campaign.json");
        self.write_once(path, campaign, RecordKind::Campaign).await
    }

    async fn scenarios(&self) -> Result<Vec<Scenario>, StoreError> {
        let records: Vec<(String, Scenario)> = self.read_all(self.root.join("scenarios")).await?;
        Ok(records.into_iter().map(|(_, s)| s).collect())
    }

    async fn retirements(&self) -> Result<Vec<Retirement>, StoreError> {
        let records: Vec<(String, Retirement)> = self.read_all(self.root.join("retirements")).await?;
        let mut out: Vec<Retirement> = records.into_iter().map(|(_, r)| r).collect();
        out.sort_by_key(|r| r.retired_at);
        Ok(out)
    }

    async fn documents(&self, skill: &SkillId) -> Result<Vec<SkillDocument>, StoreError> {
        let dir = self.root.join("documents").join(file_key(skill.as_str()));
        let records: Vec<(String, SkillDocument)> = self.read_all(dir).await?;
        let mut out: Vec<SkillDocument> = records.into_iter().map(|(_, d)| d).collect();
        out.sort_by_key(SkillDocument::version);
        Ok(out)
    }

    async fn iterations(&self, campaign: CampaignId) -> Result<Vec<Iteration>, StoreError> {
        let records: Vec<(String, serde_json::Value)> = self.read_all(self.campaign_dir(campaign)).await?;
        let mut out = Vec::new();
        for (stem, value) in records {
            if stem.starts_with("iteration-") {
                out.push(serde_json::from_value::<Iteration>(value)?);
            }
        }
        out.sort_by_key(|i| i.index);
        Ok(out)
    }

    async fn campaign(&self, campaign: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let path = self.campaign_dir(campaign).join("campaign.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_model::{Pressure, ScenarioOption};

    fn scenario(id: &str) -> Scenario {
        Scenario::new(
            id,
            "It is 6pm and the demo is at 9am.",
            [Pressure::Time, Pressure::Exhaustion],
            vec![
                ScenarioOption::new("A", "Follow the rule"),
                ScenarioOption::new("B", "Skip it"),
            ],
            "A",
        )
        .unwrap()
    }

    fn document(version: u32) -> SkillDocument {
        let mut doc = SkillDocument::draft(SkillId::new("tdd"), "Use when writing code")
            .with_rule("Test first.");
        for v in 0..version {
            doc = doc
                .augment(&crucible_model::Augmentation {
                    red_flags: vec![format!("flag {v}")],
                    ..Default::default()
                })
                .unwrap();
        }
        doc
    }

    #[tokio::test]
    async fn memory_store_is_append_only() {
        let store = MemoryStore::new();
        store.put_scenario(&scenario("s1")).await.unwrap();
        let err = store.put_scenario(&scenario("s1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: RecordKind::Scenario, .. }));

        store.put_document(&document(0)).await.unwrap();
        store.put_document(&document(1)).await.unwrap();
        assert!(store.put_document(&document(1)).await.is_err());
        let docs = store.documents(&SkillId::new("tdd")).await.unwrap();
        assert_eq!(docs.iter().map(SkillDocument::version).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn json_store_roundtrips_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();

        store.put_scenario(&scenario("deadline/1")).await.unwrap();
        store.put_scenario(&scenario("deadline-2")).await.unwrap();
        assert!(store.put_scenario(&scenario("deadline-2")).await.is_err());

        store.put_document(&document(0)).await.unwrap();
        store.put_document(&document(1)).await.unwrap();

        let reopened = JsonDirStore::open(dir.path()).await.unwrap();
        let scenarios = reopened.scenarios().await.unwrap();
        assert_eq!(scenarios.len(), 2);
        let docs = reopened.documents(&SkillId::new("tdd")).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1], document(1));
        assert!(reopened.campaign(CampaignId::new()).await.unwrap().is_none());
    }

    #[test]
    fn file_key_is_path_safe() {
        assert_eq!(file_key("a/b c"), "a_b_c");
        assert_eq!(file_key("tdd-v1"), "tdd-v1");
        assert_eq!(file_key(".."), "__");
    }
}
