//! In-process record and index sources.

use super::{IndexSource, RecordSource};
use crate::FactdexError;
use crate::record::FactRecord;
use std::cell::Cell;
use std::collections::BTreeMap;

/// Records held in memory, keyed by node name.
///
/// Counts loads so callers can observe caching.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: BTreeMap<String, FactRecord>,
    loads: Cell<usize>,
}

impl MemoryRecordSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the record named after its node.
    pub fn insert(&mut self, record: FactRecord) {
        self.records.insert(record.name().to_string(), record);
    }

    /// Node names, sorted.
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    /// All records, sorted by node name.
    #[must_use]
    pub fn records(&self) -> Vec<FactRecord> {
        self.records.values().cloned().collect()
    }

    /// Number of successful `load` calls so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}

impl FromIterator<FactRecord> for MemoryRecordSource {
    fn from_iter<I: IntoIterator<Item = FactRecord>>(iter: I) -> Self {
        let mut source = Self::new();
        for record in iter {
            source.insert(record);
        }
        source
    }
}

impl RecordSource for MemoryRecordSource {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        let record = self
            .records
            .get(node)
            .cloned()
            .ok_or_else(|| FactdexError::RecordNotFound(node.to_string()))?;
        self.loads.set(self.loads.get() + 1);
        Ok(record)
    }
}

/// Serialized indexes held in memory, keyed by location.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexSource {
    documents: BTreeMap<String, String>,
}

impl MemoryIndexSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexSource for MemoryIndexSource {
    fn fetch(&self, location: &str) -> Result<String, FactdexError> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| FactdexError::IndexSourceNotFound(location.to_string()))
    }

    fn store(&mut self, location: &str, text: &str) -> Result<(), FactdexError> {
        self.documents.insert(location.to_string(), text.to_string());
        Ok(())
    }
}
