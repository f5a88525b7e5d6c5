//! Skill version chains
//!
//! Each skill owns one linear chain `v0 -> v1 -> ...`. A version is accepted
//! only if it is the direct, strictly additive successor of the chain head
//! (see [`SkillDocument::check_extends`]). Once a campaign converges the
//! chain is frozen and refuses further versions.

use crate::error::StoreError;
use crate::persist::{PersistentStore, RecordKind};
use crucible_model::{SkillDocument, SkillId};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Chain {
    versions: Vec<Arc<SkillDocument>>,
    frozen: bool,
}

/// Immutable, linearly versioned documents per skill
pub struct SkillVersionStore {
    store: Arc<dyn PersistentStore>,
    chains: DashMap<SkillId, Chain>,
}

impl std::fmt::Debug for SkillVersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillVersionStore")
            .field("skills", &self.chains.len())
            .finish_non_exhaustive()
    }
}

impl SkillVersionStore {
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            chains: DashMap::new(),
        }
    }

    /// Reload the chain for `skill` from the store, re-verifying every link
    ///
    /// # Errors
    /// - `StoreError::UnknownSkill` if nothing is stored for `skill`
    /// - `StoreError::Model` if a stored link is not a monotonic augmentation
    pub async fn load(&self, skill: &SkillId) -> Result<Arc<SkillDocument>, StoreError> {
        let documents = self.store.documents(skill).await?;
        let Some(first) = documents.first() else {
            return Err(StoreError::UnknownSkill(skill.to_string()));
        };
        if first.version() != 0 {
            return Err(StoreError::VersionGap {
                skill: skill.to_string(),
                expected: 0,
                actual: first.version(),
            });
        }
        for pair in documents.windows(2) {
            pair[1].check_extends(&pair[0])?;
        }
        let versions: Vec<Arc<SkillDocument>> = documents.into_iter().map(Arc::new).collect();
        let head = versions[versions.len() - 1].clone();
        self.chains.insert(
            skill.clone(),
            Chain {
                versions,
                frozen: false,
            },
        );
        Ok(head)
    }

    /// Store the first authored draft as version 0
    ///
    /// # Errors
    /// - `StoreError::VersionGap` if the draft is not version 0
    /// - `StoreError::AlreadyExists` if the skill already has a chain
    pub async fn init(&self, draft: SkillDocument) -> Result<Arc<SkillDocument>, StoreError> {
        if draft.version() != 0 {
            return Err(StoreError::VersionGap {
                skill: draft.skill().to_string(),
                expected: 0,
                actual: draft.version(),
            });
        }
        if self.chains.contains_key(draft.skill()) {
            return Err(StoreError::AlreadyExists {
                kind: RecordKind::Document,
                key: format!("{}@0", draft.skill()),
            });
        }
        self.store.put_document(&draft).await?;
        let draft = Arc::new(draft);
        self.chains
            .entry(draft.skill().clone())
            .or_default()
            .versions
            .push(draft.clone());
        tracing::info!(skill = %draft.skill(), hash = %draft.content_hash().short(), "skill draft stored");
        Ok(draft)
    }

    /// Append the next version to a skill's chain
    ///
    /// # Errors
    /// - `StoreError::UnknownSkill` if the skill has no version 0
    /// - `StoreError::Frozen` after [`freeze`](Self::freeze)
    /// - `StoreError::Model` if `next` does not strictly extend the head
    pub async fn publish(&self, next: SkillDocument) -> Result<Arc<SkillDocument>, StoreError> {
        let head = self.check_publishable(&next)?;
        next.check_extends(&head)?;
        self.store.put_document(&next).await?;

        let next = Arc::new(next);
        let mut chain = self
            .chains
            .get_mut(next.skill())
            .ok_or_else(|| StoreError::UnknownSkill(next.skill().to_string()))?;
        let expected = u32::try_from(chain.versions.len()).unwrap_or(u32::MAX);
        if next.version() != expected {
            return Err(StoreError::VersionGap {
                skill: next.skill().to_string(),
                expected,
                actual: next.version(),
            });
        }
        chain.versions.push(next.clone());
        tracing::info!(
            skill = %next.skill(),
            version = next.version(),
            hash = %next.content_hash().short(),
            "skill version published"
        );
        Ok(next)
    }

    fn check_publishable(&self, next: &SkillDocument) -> Result<Arc<SkillDocument>, StoreError> {
        let chain = self
            .chains
            .get(next.skill())
            .ok_or_else(|| StoreError::UnknownSkill(next.skill().to_string()))?;
        let head = chain
            .versions
            .last()
            .cloned()
            .ok_or_else(|| StoreError::UnknownSkill(next.skill().to_string()))?;
        if chain.frozen {
            return Err(StoreError::Frozen {
                skill: next.skill().to_string(),
                version: head.version(),
            });
        }
        Ok(head)
    }

    /// Freeze the chain at its current head
    ///
    /// # Errors
    /// `StoreError::UnknownSkill` if the skill has no chain.
    pub fn freeze(&self, skill: &SkillId) -> Result<Arc<SkillDocument>, StoreError> {
        let mut chain = self
            .chains
            .get_mut(skill)
            .ok_or_else(|| StoreError::UnknownSkill(skill.to_string()))?;
        chain.frozen = true;
        let head = chain
            .versions
            .last()
            .cloned()
            .ok_or_else(|| StoreError::UnknownSkill(skill.to_string()))?;
        tracing::info!(skill = %skill, version = head.version(), "skill frozen");
        Ok(head)
    }

    #[must_use]
    pub fn is_frozen(&self, skill: &SkillId) -> bool {
        self.chains.get(skill).is_some_and(|c| c.frozen)
    }

    #[must_use]
    pub fn latest(&self, skill: &SkillId) -> Option<Arc<SkillDocument>> {
        self.chains.get(skill).and_then(|c| c.versions.last().cloned())
    }

    #[must_use]
    pub fn get(&self, skill: &SkillId, version: u32) -> Option<Arc<SkillDocument>> {
        self.chains
            .get(skill)
            .and_then(|c| c.versions.get(version as usize).cloned())
    }

    /// Every version of `skill`, ascending
    #[must_use]
    pub fn history(&self, skill: &SkillId) -> Vec<Arc<SkillDocument>> {
        self.chains
            .get(skill)
            .map(|c| c.versions.clone())
            .unwrap_or_default()
    }
}
