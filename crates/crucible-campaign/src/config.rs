//! Campaign configuration
//!
//! Every limit the convergence loop depends on is supplied here, with
//! documented defaults, rather than baked into the orchestrator.

use crate::error::CampaignError;
use crucible_classify::DEFAULT_MATCH_THRESHOLD;
use crucible_refine::{DEFAULT_NEAR_DUPLICATE_RATIO, DEFAULT_RECURRENCE_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Campaign configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Iterations allowed before the campaign is abandoned
    pub max_iterations: u32,
    /// Recurrences of a countered signature tolerated before abandoning
    pub recurrence_limit: u32,
    /// Per-run deadline in seconds
    pub run_deadline_secs: u64,
    /// Worker pool size
    pub max_concurrent_runs: usize,
    /// Scenarios with fewer pressures are left out of the active set
    pub min_pressure_count: usize,
    /// Option-matcher confidence threshold
    pub match_threshold: f64,
    /// Normalized edit distance under which rationalizations merge
    pub near_duplicate_ratio: f64,
    /// Add pressure trigger phrases to the description when refining
    pub extend_triggers: bool,
    /// Where to export the report once the campaign is terminal
    pub report_path: Option<PathBuf>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            recurrence_limit: DEFAULT_RECURRENCE_LIMIT,
            run_deadline_secs: 120,
            max_concurrent_runs: 4,
            min_pressure_count: 1,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            near_duplicate_ratio: DEFAULT_NEAR_DUPLICATE_RATIO,
            extend_triggers: true,
            report_path: None,
        }
    }
}

impl CampaignConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; missing keys take their defaults
    ///
    /// # Errors
    /// `CampaignError::ConfigParse` on malformed TOML, `CampaignError::Config`
    /// if the values fail [`validate`](Self::validate).
    pub fn from_toml(source: &str) -> Result<Self, CampaignError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// I/O failures and everything [`from_toml`](Self::from_toml) rejects.
    pub fn load(path: &Path) -> Result<Self, CampaignError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// # Errors
    /// `CampaignError::Config` naming the first offending key.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.max_iterations == 0 {
            return Err(CampaignError::Config("max_iterations must be at least 1".into()));
        }
        if self.recurrence_limit == 0 {
            return Err(CampaignError::Config("recurrence_limit must be at least 1".into()));
        }
        if self.run_deadline_secs == 0 {
            return Err(CampaignError::Config("run_deadline_secs must be at least 1".into()));
        }
        if self.max_concurrent_runs == 0 {
            return Err(CampaignError::Config("max_concurrent_runs must be at least 1".into()));
        }
        for (key, value) in [
            ("match_threshold", self.match_threshold),
            ("near_duplicate_ratio", self.near_duplicate_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CampaignError::Config(format!("{key} must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_recurrence_limit(mut self, limit: u32) -> Self {
        self.recurrence_limit = limit;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_run_deadline_secs(mut self, secs: u64) -> Self {
        self.run_deadline_secs = secs;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_concurrent_runs(mut self, runs: usize) -> Self {
        self.max_concurrent_runs = runs;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_min_pressure_count(mut self, count: usize) -> Self {
        self.min_pressure_count = count;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_near_duplicate_ratio(mut self, ratio: f64) -> Self {
        self.near_duplicate_ratio = ratio;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_extend_triggers(mut self, extend: bool) -> Self {
        self.extend_triggers = extend;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}
