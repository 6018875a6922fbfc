//! # Persistence Format
//!
//! Binary serialization for fact records stored in the record database.
//!
//! Format: Header (5 bytes) + postcard-serialized record.
//! - 4 bytes: Magic ("FDXR")
//! - 1 byte: Version
//!
//! `Value` deserializes through `deserialize_any`, which postcard cannot
//! drive, so records go through the `StoredValue` mirror with derived serde.
//! The size limit and header are checked before the payload is parsed.

use crate::record::FactRecord;
use crate::{FactMap, FactdexError, Value, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum allowed payload size for one stored record.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all record data.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), FactdexError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FactdexError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FactdexError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FactdexError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(FactdexError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// STORED FORM
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoredValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<StoredValue>),
    Map(BTreeMap<String, StoredValue>),
}

impl From<&Value> for StoredValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Integer(n) => Self::Integer(*n),
            Value::Float(x) => Self::Float(*x),
            Value::String(s) => Self::String(s.clone()),
            Value::List(items) => Self::List(items.iter().map(Self::from).collect()),
            Value::Map(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<StoredValue> for Value {
    fn from(stored: StoredValue) -> Self {
        match stored {
            StoredValue::Bool(b) => Self::Bool(b),
            StoredValue::Integer(n) => Self::Integer(n),
            StoredValue::Float(x) => Self::Float(x),
            StoredValue::String(s) => Self::String(s),
            StoredValue::List(items) => Self::List(items.into_iter().map(Self::from).collect()),
            StoredValue::Map(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect::<FactMap>(),
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    name: String,
    value: Option<StoredValue>,
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a record to bytes (header + payload).
pub fn record_to_bytes(record: &FactRecord) -> Result<Vec<u8>, FactdexError> {
    let header = PersistenceHeader::new();
    let stored = StoredRecord {
        name: record.name().to_string(),
        value: record.value(None).map(StoredValue::from),
    };

    let payload = postcard::to_stdvec(&stored)
        .map_err(|e| FactdexError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a record from bytes.
///
/// Size and header are validated before the payload is parsed.
pub fn record_from_bytes(bytes: &[u8]) -> Result<FactRecord, FactdexError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(FactdexError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    let stored: StoredRecord = postcard::from_bytes(payload).map_err(|e| {
        FactdexError::DeserializationError(format!("Failed to deserialize record: {}", e))
    })?;

    Ok(FactRecord::new(stored.name, stored.value.map(Value::from)))
}

// =============================================================================
// TESTS
// =============================================================================
