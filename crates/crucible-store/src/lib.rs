//! Crucible Store
//!
//! Immutable catalogs over an append-only persistence collaborator.
//!
//! # Overview
//!
//! - **[`PersistentStore`]**: create-and-read storage for scenarios,
//!   retirements, document versions and campaign records. Writing a key
//!   twice fails; nothing is ever updated.
//! - **[`ScenarioCatalog`]**: accepted scenarios, soft retirement, active-set
//!   queries.
//! - **[`SkillVersionStore`]**: one linear, strictly additive chain of
//!   document versions per skill.
//!
//! # Example
//!
//! ```rust,ignore
//! use crucible_store::{MemoryStore, ScenarioCatalog};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let catalog = ScenarioCatalog::new(store.clone());
//! catalog.add(scenario).await?;
//! let active = catalog.list_active(2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod catalog;
pub mod error;
pub mod persist;
pub mod versions;

pub use catalog::ScenarioCatalog;
pub use error::StoreError;
pub use persist::{JsonDirStore, MemoryStore, PersistentStore, RecordKind, Retirement};
pub use versions::SkillVersionStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
