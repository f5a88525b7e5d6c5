//! Crucible Refine: rationalization signatures and document refinement
//!
//! # Core Concepts
//!
//! - [`RationalizationRegistry`]: folds paraphrased excuses into stable
//!   signatures and flags the novel ones
//! - [`RefinementEngine`]: appends counters for findings to produce the next
//!   document version
//! - [`RecurrenceGuard`]: trips when a countered signature keeps coming back

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod guard;
pub mod registry;
mod text_slots;

pub use engine::{Finding, RefinementEngine};
pub use error::RefineError;
pub use guard::{RecurrenceGuard, DEFAULT_RECURRENCE_LIMIT};
pub use registry::{
    RationalizationRegistry, SignatureEntry, DEFAULT_NEAR_DUPLICATE_RATIO, KNOWN_RATIONALIZATIONS,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
