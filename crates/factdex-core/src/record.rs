//! # Fact Records
//!
//! A named value. A node record carries the node name and a map of facts; a
//! single fact carries the fact name and that fact's value.

use crate::mutation::{self, MutationReport};
use crate::path::{Path, Segment};
use crate::transform::Transform;
use crate::{FactMap, FactdexError, Value};
use serde::{Deserialize, Serialize};

/// Chooses which top-level facts a rule applies to.
///
/// `fact` overrides everything; otherwise `regexp` selects every matching
/// key; with neither, the rule's own tag names the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
}

/// A name and an optional value.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
    name: String,
    value: Option<Value>,
}

impl FactRecord {
    /// Create a record.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Create a node record from its fact map.
    #[must_use]
    pub fn from_map(name: impl Into<String>, facts: FactMap) -> Self {
        Self::new(name, Some(Value::Map(facts)))
    }

    /// The record name (node name or fact name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The whole value, or the value at `path` inside it.
    ///
    /// Never fails: a miss, or a path into a non-map value, yields `None`.
    #[must_use]
    pub fn value(&self, path: Option<&Path>) -> Option<&Value> {
        match path {
            None => self.value.as_ref(),
            Some(path) => mutation::get(self.value.as_ref()?.as_map()?, path),
        }
    }

    /// The facts of a node record; `None` for a record with a scalar or no value.
    #[must_use]
    pub fn facts(&self) -> Option<&FactMap> {
        self.value.as_ref().and_then(Value::as_map)
    }

    /// Consume the record, returning its value.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// Apply `transform` to the whole value, or at `path` inside it.
    ///
    /// Without a path the transform sees the one-entry record `{name: value}`
    /// and the path `name`. With a path, a record without a value becomes a
    /// map when the transform writes something; a scalar value fails with
    /// `NotStructured`.
    pub fn set_value(
        &mut self,
        transform: &Transform,
        path: Option<&Path>,
    ) -> Result<MutationReport, FactdexError> {
        let Some(path) = path else {
            return self.set_whole(transform);
        };

        match &mut self.value {
            Some(Value::Map(map)) => mutation::set(map, path, transform),
            Some(_) => Err(FactdexError::NotStructured(self.name.clone())),
            None => {
                let mut map = FactMap::new();
                let report = mutation::set(&mut map, path, transform)?;
                if report.written > 0 {
                    self.value = Some(Value::Map(map));
                }
                Ok(report)
            }
        }
    }

    /// Apply `transform` at a path given in the structured form.
    pub fn set_value_structured(
        &mut self,
        transform: &Transform,
        items: &[Value],
    ) -> Result<MutationReport, FactdexError> {
        let path = Path::structured(items)?;
        self.set_value(transform, Some(&path))
    }

    fn set_whole(&mut self, transform: &Transform) -> Result<MutationReport, FactdexError> {
        let path = Path::literal(self.name.clone());
        let mut scope = FactMap::new();
        if let Some(value) = self.value.take() {
            scope.insert(self.name.clone(), value);
        }

        let result = transform.apply(&scope, &path, scope.get(&self.name));
        let had_value = scope.contains_key(&self.name);
        match result {
            Ok(new_value) => {
                let report = MutationReport {
                    written: usize::from(new_value.is_some()),
                    removed: usize::from(new_value.is_none() && had_value),
                    vivified: false,
                };
                self.value = new_value;
                Ok(report)
            }
            Err(e) => {
                self.value = scope.remove(&self.name);
                Err(e)
            }
        }
    }

    /// Names of the top-level facts a rule applies to.
    ///
    /// `[fact]` when overridden, `[tag_default]` without a pattern, otherwise
    /// every current top-level key the pattern finds a match in, in map order.
    pub fn matching_keys(
        &self,
        tag_default: &str,
        selector: &FactSelector,
    ) -> Result<Vec<String>, FactdexError> {
        if let Some(fact) = &selector.fact {
            return Ok(vec![fact.clone()]);
        }
        let Some(source) = &selector.regexp else {
            return Ok(vec![tag_default.to_string()]);
        };
        let segment = Segment::pattern(source)?;
        Ok(self
            .facts()
            .map(|facts| {
                facts
                    .keys()
                    .filter(|key| segment.matches(key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Detach one top-level fact of a node record as its own record.
    ///
    /// The returned record has no value when the fact is absent.
    pub fn take_fact(&mut self, fact: &str) -> FactRecord {
        let value = self
            .value
            .as_mut()
            .and_then(Value::as_map_mut)
            .and_then(|facts| facts.remove(fact));
        FactRecord::new(fact, value)
    }

    /// Put a fact record back into this node record. A fact without a value
    /// is left out.
    pub fn put_fact(&mut self, fact: FactRecord) {
        let FactRecord { name, value } = fact;
        let Some(value) = value else {
            return;
        };
        match &mut self.value {
            Some(Value::Map(facts)) => {
                facts.insert(name, value);
            }
            slot => {
                let mut facts = FactMap::new();
                facts.insert(name, value);
                *slot = Some(Value::Map(facts));
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
