//! # Canonical Export Module
//!
//! Deterministic YAML form of a `FactIndex`. This text is what gets written
//! to disk and what checksums are computed over, so it must be identical for
//! equal indexes:
//! - attribute names and value keys sorted (they are `BTreeMap`s)
//! - every node list sorted
//! - `_nodes` stored as a flat list next to the attributes
//!
//! Parsing accepts any ordering and stringifies non-string keys and node
//! names the same way `Value::index_key` does.

use crate::formats::yaml;
use crate::index::{Buckets, FactIndex};
use crate::primitives::NODES_KEY;
use crate::{FactMap, FactdexError, Value};
use std::collections::BTreeMap;

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Build the sorted document tree of an index.
#[must_use]
pub fn canonical_value(index: &FactIndex) -> Value {
    let mut root = FactMap::new();
    for attribute in index.attributes() {
        let mut values = FactMap::new();
        for (key, nodes) in index.buckets(attribute).into_iter().flatten() {
            values.insert(key.clone(), sorted_list(nodes));
        }
        root.insert(attribute.to_string(), Value::Map(values));
    }
    if let Some(nodes) = index.stored_nodes() {
        root.insert(NODES_KEY.to_string(), sorted_list(nodes));
    }
    Value::Map(root)
}

fn sorted_list(nodes: &[String]) -> Value {
    let mut nodes = nodes.to_vec();
    nodes.sort();
    Value::List(nodes.into_iter().map(Value::String).collect())
}

/// Export an index to its canonical YAML text.
///
/// # Errors
///
/// Returns `FactdexError::SerializationError` if serialization fails.
pub fn export_index(index: &FactIndex) -> Result<String, FactdexError> {
    yaml::to_yaml(&canonical_value(index))
}

/// Import an index from YAML text.
///
/// An empty document is an empty index.
///
/// # Errors
///
/// Returns `FactdexError::DeserializationError` if the text is not YAML or
/// does not have the index shape.
pub fn import_index(text: &str) -> Result<FactIndex, FactdexError> {
    let root = match yaml::parse_value(text)? {
        None => return Ok(FactIndex::new()),
        Some(Value::Map(root)) => root,
        Some(other) => {
            return Err(shape_error("index", &other));
        }
    };

    let mut attributes = BTreeMap::new();
    let mut nodes = None;
    for (attribute, entry) in root {
        if attribute == NODES_KEY {
            nodes = Some(node_list(&attribute, entry)?);
            continue;
        }
        let values = match entry {
            Value::Map(values) => values,
            other => return Err(shape_error(&attribute, &other)),
        };
        let mut buckets = Buckets::new();
        for (key, list) in values {
            let names = node_list(&attribute, list)?;
            buckets.insert(key, names);
        }
        attributes.insert(attribute, buckets);
    }

    Ok(FactIndex::from_parts(attributes, nodes))
}

fn node_list(attribute: &str, value: Value) -> Result<Vec<String>, FactdexError> {
    match value {
        Value::List(items) => Ok(items.iter().map(Value::index_key).collect()),
        other => Err(shape_error(attribute, &other)),
    }
}

fn shape_error(location: &str, found: &Value) -> FactdexError {
    FactdexError::DeserializationError(format!(
        "Unexpected {} at {} in index document",
        found.type_name(),
        location
    ))
}

/// Compute the canonical checksum of an index.
///
/// FNV-1a over the canonical text. Fast and stable across platforms; not
/// collision resistant.
pub fn canonical_checksum(index: &FactIndex) -> Result<u64, FactdexError> {
    Ok(fnv1a(export_index(index)?.as_bytes()))
}

/// 64-bit FNV-1a.
#[must_use]
pub fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    data.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// Compute a BLAKE3 hash of the canonical export, as a hex string
/// (64 characters).
///
/// Only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(index: &FactIndex) -> Result<String, FactdexError> {
    let text = export_index(index)?;
    Ok(blake3::hash(text.as_bytes()).to_hex().to_string())
}

/// Verify an index against a BLAKE3 hash.
#[cfg(feature = "crypto-hash")]
pub fn verify_crypto_hash(index: &FactIndex, expected_hash: &str) -> Result<bool, FactdexError> {
    Ok(canonical_crypto_hash(index)? == expected_hash)
}

// =============================================================================
// TESTS
// =============================================================================
