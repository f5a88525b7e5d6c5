//! Crucible Campaign
//!
//! Drives a skill document through repeated pressure testing until it holds.
//!
//! # Overview
//!
//! - **[`ExecutionHarness`]**: isolated, bounded, deadline-guarded runs of
//!   (version, scenario) pairs against an [`AgentRuntime`]
//! - **[`CampaignOrchestrator`]**: the Collecting -> Evaluating -> Refining
//!   loop and its convergence checks
//! - **[`HumanReviewer`]**: optional ground truth for Ambiguous decisions
//! - **[`CampaignReport`]**: hash-chained export of a finished campaign
//!
//! # Example
//!
//! ```rust,ignore
//! use crucible_campaign::{CampaignConfig, CampaignOrchestrator, ProcessAgent};
//!
//! let agent = ProcessAgent::from_command_line("my-agent --json").unwrap();
//! let mut orchestrator =
//!     CampaignOrchestrator::new(CampaignConfig::default(), store, catalog, versions, Arc::new(agent))?;
//! let campaign = orchestrator.run(&SkillId::new("tdd")).await?;
//! assert!(campaign.is_terminal());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod harness;
pub mod orchestrator;
pub mod report;
pub mod reviewer;
pub mod runtime;
pub mod state;

pub use config::CampaignConfig;
pub use error::CampaignError;
pub use harness::{CancelHandle, CancelToken, ExecutionHarness, PassResult, ResultCollector, RunOutcome};
pub use orchestrator::CampaignOrchestrator;
pub use report::{CampaignReport, ChainLink, REPORT_FORMAT};
pub use reviewer::{HumanReviewer, NoReviewer};
pub use runtime::{AgentRuntime, ProcessAgent, RuntimeError, PROMPT_SEPARATOR};
pub use state::{CampaignState, StateMachine};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
