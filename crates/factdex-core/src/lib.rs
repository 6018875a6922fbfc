//! # factdex-core
//!
//! The deterministic fact selection engine for factdex - THE LOGIC.
//!
//! This crate holds fact fixtures (node records: a node name and a nested
//! map of facts), the inverted index over them, and the engines that pick a
//! fixture by its facts and rewrite facts by structured paths.
//!
//! ## Layers
//!
//! - `types`, `path`, `transform`, `mutation`: values and path-addressed edits
//! - `record`, `index`, `export`: node records and the fact index
//! - `query`, `selection`, `session`: select / reject / prefer and the
//!   manipulation lock
//! - `plugins`, `fixture`: sanitizing raw facts into fixtures
//! - `formats`, `storage`: documents on disk and the collaborator traits
//!
//! ## Architectural Constraints
//!
//! - BTreeMap only: every listing and serialization is ordered
//! - No async, no network dependencies (pure Rust)
//! - Engines are plain owned values; nothing is shared across threads
//! - No logging here; callers inspect `SelectionStats` instead

// =============================================================================
// MODULES
// =============================================================================

pub mod export;
pub mod fixture;
pub mod formats;
pub mod index;
pub mod mutation;
pub mod path;
pub mod plugins;
pub mod primitives;
pub mod query;
pub mod record;
pub mod selection;
pub mod session;
pub mod storage;
pub mod transform;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{FactMap, FactdexError, Value};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use export::{canonical_checksum, export_index, import_index};
pub use fixture::FixtureBuilder;
pub use index::FactIndex;
pub use mutation::MutationReport;
pub use path::{Path, Segment};
pub use plugins::{FactRule, PluginRegistry, apply_rules};
pub use query::{Condition, Conditions, Query, QueryType};
pub use record::{FactRecord, FactSelector};
pub use selection::{SelectionEngine, SelectionStats};
pub use session::{FactBackend, FactSession, FileBackend};
pub use storage::{IndexSource, RecordSource, RedbRecordStore};
pub use transform::Transform;

#[cfg(feature = "crypto-hash")]
pub use export::{canonical_crypto_hash, verify_crypto_hash};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, record_from_bytes, record_to_bytes};
