//! # redb-backed Record Store
//!
//! A disk-backed snapshot of node records using the redb embedded database.
//!
//! Fact documents are the source of truth; this store holds already-parsed
//! records so repeated selection runs skip YAML parsing. Each value is a
//! record in the binary persistence format (magic + version + postcard).

use super::{RecordSource, validate_node_name};
use crate::FactdexError;
use crate::formats::{record_from_bytes, record_to_bytes};
use crate::record::FactRecord;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for records: node name -> serialized record bytes
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

fn io_error(e: impl std::fmt::Display) -> FactdexError {
    FactdexError::IoError(e.to_string())
}

/// A disk-backed record store using redb.
pub struct RedbRecordStore {
    db: Database,
}

impl std::fmt::Debug for RedbRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRecordStore").finish_non_exhaustive()
    }
}

impl RedbRecordStore {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FactdexError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db.begin_write().map_err(io_error)?;
            let _ = write_txn.open_table(RECORDS).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        Ok(Self { db })
    }

    /// Store records in a single transaction, replacing existing ones.
    ///
    /// Every record is validated and encoded before the transaction opens, so
    /// a bad record leaves the store untouched.
    pub fn put_batch(&mut self, records: &[FactRecord]) -> Result<(), FactdexError> {
        let encoded = records
            .iter()
            .map(|record| -> Result<(String, Vec<u8>), FactdexError> {
                validate_node_name(record.name())?;
                Ok((record.name().to_string(), record_to_bytes(record)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(io_error)?;
            for (node, bytes) in &encoded {
                table.insert(node.as_str(), bytes.as_slice()).map_err(io_error)?;
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }

    /// Store one record.
    pub fn put(&mut self, record: &FactRecord) -> Result<(), FactdexError> {
        self.put_batch(std::slice::from_ref(record))
    }

    /// Remove the record of `node`. Returns whether one existed.
    pub fn remove(&mut self, node: &str) -> Result<bool, FactdexError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let existed = {
            let mut table = write_txn.open_table(RECORDS).map_err(io_error)?;
            table.remove(node).map_err(io_error)?.is_some()
        };
        write_txn.commit().map_err(io_error)?;
        Ok(existed)
    }

    /// Stored node names, sorted.
    pub fn nodes(&self) -> Result<Vec<String>, FactdexError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        let mut nodes = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (key, _) = entry.map_err(io_error)?;
            nodes.push(key.value().to_string());
        }
        Ok(nodes)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<u64, FactdexError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        table.len().map_err(io_error)
    }

    /// Check whether the store holds no records.
    pub fn is_empty(&self) -> Result<bool, FactdexError> {
        Ok(self.len()? == 0)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), FactdexError> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }
}

impl RecordSource for RedbRecordStore {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RECORDS).map_err(io_error)?;
        let entry = table
            .get(node)
            .map_err(io_error)?
            .ok_or_else(|| FactdexError::RecordNotFound(node.to_string()))?;
        record_from_bytes(entry.value())
    }
}

// =============================================================================
// TESTS
// =============================================================================
