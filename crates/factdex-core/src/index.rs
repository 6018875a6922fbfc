//! # Fact Index
//!
//! Attribute name → stringified attribute value → node names holding it,
//! plus the reserved `_nodes` list of every indexed node.
//!
//! An attribute counts as indexed once its name is a key, even when its
//! buckets are incomplete. This is what lazy indexing in the selection engine
//! checks, and the index is mutated in place as attributes get added.

use crate::export;
use crate::path::Path;
use crate::primitives::NODES_KEY;
use crate::record::FactRecord;
use crate::storage::IndexSource;
use crate::FactdexError;
use std::collections::{BTreeMap, BTreeSet};

/// Stringified value → node names, in insertion order.
pub type Buckets = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactIndex {
    attributes: BTreeMap<String, Buckets>,
    nodes: Option<Vec<String>>,
}

impl FactIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from raw parts.
    #[must_use]
    pub fn from_parts(attributes: BTreeMap<String, Buckets>, nodes: Option<Vec<String>>) -> Self {
        Self { attributes, nodes }
    }

    /// Index `attribute` over `records`.
    ///
    /// The attribute is resolved as a dotted path. Records without a value for
    /// it are skipped, but the attribute entry is created regardless. Calling
    /// this again extends existing buckets; duplicates are kept.
    pub fn add(&mut self, attribute: &str, records: &[FactRecord]) {
        self.add_iter(attribute, records.iter());
    }

    /// `add` over any sequence of borrowed records.
    pub fn add_iter<'a>(
        &mut self,
        attribute: &str,
        records: impl IntoIterator<Item = &'a FactRecord>,
    ) {
        if attribute == NODES_KEY {
            return;
        }
        let path = Path::dotted(attribute);
        let buckets = self.attributes.entry(attribute.to_string()).or_default();
        for record in records {
            if let Some(value) = record.value(Some(&path)) {
                buckets
                    .entry(value.index_key())
                    .or_default()
                    .push(record.name().to_string());
            }
        }
    }

    /// Clear the index, index each attribute over `records`, and set the node
    /// list to the sorted record names.
    pub fn reindex<S: AsRef<str>>(&mut self, attributes: &[S], records: &[FactRecord]) {
        self.attributes.clear();
        for attribute in attributes {
            self.add(attribute.as_ref(), records);
        }
        let mut nodes: Vec<String> = records.iter().map(|r| r.name().to_string()).collect();
        nodes.sort();
        self.nodes = Some(nodes);
    }

    /// Indexed node names.
    ///
    /// Quick mode returns the stored node list when there is one. Otherwise
    /// the list is the sorted, de-duplicated union of every bucket.
    #[must_use]
    pub fn nodes(&self, quick: bool) -> Vec<String> {
        if quick {
            if let Some(nodes) = &self.nodes {
                return nodes.clone();
            }
        }
        let seen: BTreeSet<&String> = self
            .attributes
            .values()
            .flat_map(BTreeMap::values)
            .flatten()
            .collect();
        seen.into_iter().cloned().collect()
    }

    /// The stored node list, if any.
    #[must_use]
    pub fn stored_nodes(&self) -> Option<&[String]> {
        self.nodes.as_deref()
    }

    /// Replace the stored node list.
    pub fn set_nodes(&mut self, mut nodes: Vec<String>) {
        nodes.sort();
        self.nodes = Some(nodes);
    }

    /// Check whether `attribute` is a key of the index.
    #[must_use]
    pub fn is_indexed(&self, attribute: &str) -> bool {
        (attribute == NODES_KEY && self.nodes.is_some()) || self.attributes.contains_key(attribute)
    }

    /// Node names holding `value_key` for `attribute`.
    #[must_use]
    pub fn bucket(&self, attribute: &str, value_key: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .and_then(|buckets| buckets.get(value_key))
            .map(Vec::as_slice)
    }

    /// All buckets of `attribute`.
    #[must_use]
    pub fn buckets(&self, attribute: &str) -> Option<&Buckets> {
        self.attributes.get(attribute)
    }

    /// Indexed attribute names, sorted. The reserved node list is not included.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Number of indexed attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    // =========================================================================
    // SERIALIZATION
    // =========================================================================

    /// Canonical YAML form: keys and lists sorted at every level.
    pub fn to_yaml(&self) -> Result<String, FactdexError> {
        export::export_index(self)
    }

    /// Parse the YAML form. No particular ordering is required.
    pub fn from_yaml(text: &str) -> Result<Self, FactdexError> {
        export::import_index(text)
    }

    /// Fetch and parse the index stored at `location`.
    pub fn load(source: &dyn IndexSource, location: &str) -> Result<Self, FactdexError> {
        Self::from_yaml(&source.fetch(location)?)
    }

    /// Write the canonical form to `location`.
    pub fn save(&self, source: &mut dyn IndexSource, location: &str) -> Result<(), FactdexError> {
        source.store(location, &self.to_yaml()?)
    }

    /// Checksum of the canonical form.
    pub fn checksum(&self) -> Result<u64, FactdexError> {
        export::canonical_checksum(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
