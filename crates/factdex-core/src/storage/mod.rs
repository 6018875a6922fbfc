//! # Storage
//!
//! The boundary to wherever records and indexes live.
//!
//! - `RecordSource`: node name → `FactRecord`
//! - `IndexSource`: location → serialized index text, and back
//!
//! The engines only see these traits. Backends:
//! - `MemoryRecordSource` / `MemoryIndexSource`: in-process maps
//! - `DirectoryRecordSource` / `TemplateRecordSource` / `FileIndexSource`:
//!   YAML documents on the local filesystem
//! - `RedbRecordStore`: redb database of binary-encoded records

pub mod files;
pub mod memory;
pub mod redb_records;

pub use files::{DirectoryRecordSource, FileIndexSource, TemplateRecordSource};
pub use memory::{MemoryIndexSource, MemoryRecordSource};
pub use redb_records::RedbRecordStore;

use crate::FactdexError;
use crate::primitives::MAX_NODE_NAME_LENGTH;
use crate::record::FactRecord;

/// Loads node records by name.
pub trait RecordSource {
    /// Load the record of `node`.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` when the source has no record for the node.
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError>;
}

/// Reads and writes serialized indexes.
pub trait IndexSource {
    /// Fetch the serialized index at `location`.
    ///
    /// # Errors
    ///
    /// `IndexSourceNotFound` when nothing is stored there.
    fn fetch(&self, location: &str) -> Result<String, FactdexError>;

    /// Persist a serialized index at `location`.
    fn store(&mut self, location: &str, text: &str) -> Result<(), FactdexError>;
}

impl<T: RecordSource + ?Sized> RecordSource for &T {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        (**self).load(node)
    }
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        (**self).load(node)
    }
}

/// Check that a node name can address a record.
///
/// Node names end up in file names, so anything that could escape the
/// fixture directory is refused.
pub fn validate_node_name(node: &str) -> Result<(), FactdexError> {
    let invalid = node.is_empty()
        || node.len() > MAX_NODE_NAME_LENGTH
        || node.starts_with('.')
        || node.contains(['/', '\\', '\0'])
        || node.chars().any(char::is_whitespace);
    if invalid {
        return Err(FactdexError::InvalidNodeName(node.to_string()));
    }
    Ok(())
}
