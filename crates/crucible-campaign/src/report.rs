//! Campaign report export
//!
//! A report is the durable audit artifact of a campaign: every iteration
//! with its transcripts and decisions, the signatures seen, and the final
//! document. Iteration records are linked by a SHA-256 hash chain
//! (`hash_n = sha256(hash_{n-1} || json(iteration_n))`, starting from 32
//! zero bytes) that is checked again on load.

use crate::error::CampaignError;
use chrono::{DateTime, Utc};
use crucible_model::{Campaign, CampaignStatus, Iteration, SkillDocument, Tally};
use crucible_refine::{RationalizationRegistry, SignatureEntry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;

/// Report layout version
pub const REPORT_FORMAT: u32 = 1;

/// One link of the iteration hash chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub index: u32,
    pub prev_hash: String,
    pub hash: String,
}

/// Exported record of one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub format: u32,
    pub campaign: Campaign,
    pub final_document: SkillDocument,
    pub signatures: Vec<SignatureEntry>,
    pub tallies: Vec<Tally>,
    pub audit_chain: Vec<ChainLink>,
    pub exported_at: DateTime<Utc>,
}

impl CampaignReport {
    /// Assemble a report and compute its audit chain
    ///
    /// # Errors
    /// `CampaignError::Serialization` if an iteration cannot be encoded.
    pub fn build(
        campaign: &Campaign,
        final_document: &SkillDocument,
        registry: &RationalizationRegistry,
    ) -> Result<Self, CampaignError> {
        Ok(Self {
            format: REPORT_FORMAT,
            campaign: campaign.clone(),
            final_document: final_document.clone(),
            signatures: registry.entries().filter(|e| e.occurrences > 0).cloned().collect(),
            tallies: campaign.iterations.iter().map(Iteration::tally).collect(),
            audit_chain: chain(&campaign.iterations)?,
            exported_at: Utc::now(),
        })
    }

    /// Recompute the chain and compare it link by link
    ///
    /// # Errors
    /// `CampaignError::AuditChain` naming the first iteration that differs.
    pub fn verify(&self) -> Result<(), CampaignError> {
        let expected = chain(&self.campaign.iterations)?;
        if expected.len() != self.audit_chain.len() {
            let index = u32::try_from(expected.len().min(self.audit_chain.len())).unwrap_or(u32::MAX);
            return Err(CampaignError::AuditChain { index });
        }
        for (want, got) in expected.iter().zip(&self.audit_chain) {
            if want != got {
                return Err(CampaignError::AuditChain { index: want.index });
            }
        }
        Ok(())
    }

    /// Head of the chain, or the zero hash for a campaign without iterations
    #[must_use]
    pub fn chain_head(&self) -> String {
        self.audit_chain
            .last()
            .map_or_else(|| hex::encode([0u8; 32]), |l| l.hash.clone())
    }

    /// Write pretty JSON to `path`, creating parent directories
    ///
    /// # Errors
    /// I/O and serialization failures.
    pub async fn export(&self, path: &Path) -> Result<(), CampaignError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.partial");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&staging, path).await?;
        tracing::info!(path = %path.display(), chain_head = %self.chain_head(), "campaign report exported");
        Ok(())
    }

    /// Read a report and verify its chain
    ///
    /// # Errors
    /// I/O, parse, and `CampaignError::AuditChain` failures.
    pub fn load(path: &Path) -> Result<Self, CampaignError> {
        let report: Self = serde_json::from_slice(&std::fs::read(path)?)?;
        report.verify()?;
        Ok(report)
    }

    /// Plain-text summary for terminals
    #[must_use]
    pub fn render_text(&self) -> String {
        let campaign = &self.campaign;
        let mut out = String::new();
        let _ = writeln!(out, "Campaign {} (skill {})", campaign.id, campaign.skill);
        match &campaign.status {
            CampaignStatus::Running => {
                let _ = writeln!(out, "Status: running");
            }
            CampaignStatus::Bulletproof { final_version } => {
                let _ = writeln!(out, "Status: BULLETPROOF at version {final_version}");
            }
            CampaignStatus::Abandoned(abandonment) => {
                let _ = writeln!(out, "Status: ABANDONED ({})", abandonment.reason);
                let _ = writeln!(out, "Last stable version: {}", abandonment.last_stable_version);
                if abandonment.unresolved_signatures.is_empty() {
                    let _ = writeln!(out, "Unresolved signatures: none");
                } else {
                    let _ = writeln!(out, "Unresolved signatures:");
                    for signature in &abandonment.unresolved_signatures {
                        let _ = writeln!(out, "  - {signature}");
                    }
                }
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>4}  {:>7}  {:>9}  {:>9}  {:>9}  {:>7}  {:>6}  {:>5}",
            "iter", "version", "compliant", "violation", "ambiguous", "aborted", "rate", "novel"
        );
        for (iteration, tally) in campaign.iterations.iter().zip(&self.tallies) {
            let _ = writeln!(
                out,
                "{:>4}  {:>7}  {:>9}  {:>9}  {:>9}  {:>7}  {:>5.0}%  {:>5}",
                iteration.index,
                iteration.version,
                tally.compliant,
                tally.violation,
                tally.ambiguous,
                tally.aborted,
                tally.compliance_rate() * 100.0,
                iteration.novel_signatures.len()
            );
        }

        if !self.signatures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Rationalizations:");
            for entry in &self.signatures {
                let countered = if self.final_document.counters(entry.signature.as_str()) {
                    "countered"
                } else {
                    "open"
                };
                let _ = writeln!(out, "  - {} x{} [{countered}]", entry.signature, entry.occurrences);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Final document: version {} ({})",
            self.final_document.version(),
            self.final_document.content_hash().short()
        );
        let _ = writeln!(out, "Audit chain head: {}", self.chain_head());
        out
    }
}

fn chain(iterations: &[Iteration]) -> Result<Vec<ChainLink>, CampaignError> {
    let mut prev = [0u8; 32];
    let mut links = Vec::with_capacity(iterations.len());
    for iteration in iterations {
        let mut hasher = Sha256::new();
        hasher.update(prev);
        hasher.update(serde_json::to_vec(iteration)?);
        let hash: [u8; 32] = hasher.finalize().into();
        links.push(ChainLink {
            index: iteration.index,
            prev_hash: hex::encode(prev),
            hash: hex::encode(hash),
        });
        prev = hash;
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crucible_model::{Decision, IterationOutcome, ScenarioId, SkillId};
    use pretty_assertions::assert_eq;

    fn campaign() -> (Campaign, SkillDocument) {
        let document = SkillDocument::draft(SkillId::new("tdd"), "Use when writing code").with_rule("Test first.");
        let mut campaign = Campaign::new(SkillId::new("tdd"));
        for index in 0..2 {
            campaign.iterations.push(Iteration {
                index,
                version: 0,
                document_hash: document.content_hash(),
                transcripts: Vec::new(),
                decisions: vec![Decision::compliant(ScenarioId::new("s1"), "A")],
                novel_signatures: Vec::new(),
                aborted: Vec::new(),
                outcome: IterationOutcome::Continue,
                started_at: Utc::now(),
                finished_at: Utc::now(),
            });
        }
        campaign.status = CampaignStatus::Bulletproof { final_version: 0 };
        (campaign, document)
    }

    #[test]
    fn chain_links_iterations() {
        let (campaign, document) = campaign();
        let report = CampaignReport::build(&campaign, &document, &RationalizationRegistry::default()).unwrap();
        assert_eq!(report.audit_chain.len(), 2);
        assert_eq!(report.audit_chain[0].prev_hash, hex::encode([0u8; 32]));
        assert_eq!(report.audit_chain[1].prev_hash, report.audit_chain[0].hash);
        report.verify().unwrap();
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let (campaign, document) = campaign();
        let mut report = CampaignReport::build(&campaign, &document, &RationalizationRegistry::default()).unwrap();
        report.campaign.iterations[1].decisions[0] = Decision::ambiguous(ScenarioId::new("s1"), "edited");
        assert!(matches!(report.verify(), Err(CampaignError::AuditChain { index: 1 })));
    }

    #[tokio::test]
    async fn export_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("tdd.json");
        let (campaign, document) = campaign();
        let report = CampaignReport::build(&campaign, &document, &RationalizationRegistry::default()).unwrap();
        report.export(&path).await.unwrap();
        assert!(!path.with_extension("json.partial").exists());
        let loaded = CampaignReport::load(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn text_summary_names_outcome() {
        let (campaign, document) = campaign();
        let text = CampaignReport::build(&campaign, &document, &RationalizationRegistry::default())
            .unwrap()
            .render_text();
        assert!(text.contains("BULLETPROOF at version 0"));
        assert!(text.contains("100%"));
    }
}
