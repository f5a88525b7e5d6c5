//! Crucible Model
//!
//! The typed vocabulary shared by every Crucible crate.
//!
//! # Core Concepts
//!
//! - [`Scenario`]: an immutable decision scenario with pressure tags and a
//!   designated compliant option
//! - [`SkillDocument`]: one immutable version of a governance document; new
//!   versions only ever add content ([`Augmentation`])
//! - [`Transcript`] / [`Decision`]: the raw and classified result of one run
//! - [`Campaign`] / [`Iteration`]: the record of a test-and-refine campaign
//! - [`ContentHash`]: 32-byte Blake3 hash over a document's canonical rendering
//!
//! # Example
//!
//! ```rust,ignore
//! use crucible_model::{SkillDocument, SkillId};
//!
//! let draft = SkillDocument::draft(SkillId::new("tdd"), "Use when writing code")
//!     .with_rule("Write the failing test first.");
//! println!("{}", draft.render_markdown());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod error;
mod hash;
mod markdown;
mod record;
mod scenario;

pub use document::{Augmentation, SkillDocument, SkillId};
pub use error::ModelError;
pub use hash::{ContentHash, HashError};
pub use record::{
    AbandonReason, Abandonment, Campaign, CampaignId, CampaignStatus, Classification, Decision,
    DecisionSource, Iteration, IterationOutcome, RunError, Signature, Tally, Transcript,
};
pub use scenario::{Pressure, Scenario, ScenarioDraft, ScenarioId, ScenarioOption};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
