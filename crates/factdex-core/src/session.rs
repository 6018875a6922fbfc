//! # Session Module
//!
//! A fact session wraps a backend that picks a node, and then lets callers
//! manipulate the chosen facts.
//!
//! Once any manipulation has been applied, the selection is frozen:
//! `select`, `reject` and `prefer` fail with `OperationNotPermitted`, since the
//! manipulated facts would otherwise silently belong to a different node.
//!
//! ## Backends
//!
//! - `SelectionEngine`: picks a node from an index
//! - `FileBackend`: a single fixed record; conditions only check it

use crate::mutation;
use crate::path::Path;
use crate::query::{Condition, Conditions};
use crate::record::FactRecord;
use crate::selection::SelectionEngine;
use crate::storage::RecordSource;
use crate::transform::Transform;
use crate::{FactMap, FactdexError, Value};

/// Something that selects a node and yields its facts.
pub trait FactBackend {
    /// Facts of the selected node.
    fn facts(&mut self) -> Result<FactMap, FactdexError>;

    fn select(&mut self, conditions: &Conditions) -> Result<(), FactdexError>;

    fn reject(&mut self, conditions: &Conditions) -> Result<(), FactdexError>;

    fn prefer(&mut self, conditions: &Conditions) -> Result<(), FactdexError>;
}

impl<S: RecordSource> FactBackend for SelectionEngine<S> {
    fn facts(&mut self) -> Result<FactMap, FactdexError> {
        Ok(SelectionEngine::facts(self)?
            .facts()
            .cloned()
            .unwrap_or_default())
    }

    fn select(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        SelectionEngine::select(self, conditions)
    }

    fn reject(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        SelectionEngine::reject(self, conditions)
    }

    fn prefer(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        SelectionEngine::prefer(self, conditions)
    }
}

/// A backend over one record.
///
/// `select` fails unless every condition matches the record's top-level
/// facts; `reject` fails if they all do; `prefer` does nothing.
#[derive(Debug, Clone)]
pub struct FileBackend {
    record: FactRecord,
}

impl FileBackend {
    #[must_use]
    pub fn new(record: FactRecord) -> Self {
        Self { record }
    }

    /// Load the record of `node` from `source`.
    pub fn load(source: &dyn RecordSource, node: &str) -> Result<Self, FactdexError> {
        Ok(Self::new(source.load(node)?))
    }

    /// First condition the record does not satisfy.
    fn first_mismatch<'a>(&self, conditions: &'a Conditions) -> Option<&'a Condition> {
        conditions.iter().find(|c| {
            self.record
                .facts()
                .and_then(|facts| facts.get(&c.attribute))
                .map(Value::index_key)
                != Some(c.value_key())
        })
    }
}

impl FactBackend for FileBackend {
    fn facts(&mut self) -> Result<FactMap, FactdexError> {
        Ok(self.record.facts().cloned().unwrap_or_default())
    }

    fn select(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        match self.first_mismatch(conditions) {
            Some(condition) => Err(FactdexError::NoMatch {
                attribute: condition.attribute.clone(),
                value: condition.value_key(),
            }),
            None => Ok(()),
        }
    }

    fn reject(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        match (self.first_mismatch(conditions), conditions.iter().next()) {
            (None, Some(condition)) => Err(FactdexError::NoMatch {
                attribute: condition.attribute.clone(),
                value: condition.value_key(),
            }),
            _ => Ok(()),
        }
    }

    fn prefer(&mut self, _conditions: &Conditions) -> Result<(), FactdexError> {
        Ok(())
    }
}

/// Selected facts plus the manipulation lock.
#[derive(Debug)]
pub struct FactSession<B: FactBackend> {
    backend: B,
    facts: Option<FactMap>,
    manipulated: bool,
    downcase_keys: bool,
}

impl<B: FactBackend> FactSession<B> {
    /// Wrap a backend. Keys are lower-cased by default.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            facts: None,
            manipulated: false,
            downcase_keys: true,
        }
    }

    /// Turn key lower-casing on or off.
    #[must_use]
    pub fn with_downcase_keys(mut self, downcase: bool) -> Self {
        self.downcase_keys = downcase;
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn is_manipulated(&self) -> bool {
        self.manipulated
    }

    // =========================================================================
    // SELECTION
    // =========================================================================

    fn unlocked(&self, operation: &str) -> Result<(), FactdexError> {
        if self.manipulated {
            return Err(FactdexError::OperationNotPermitted(operation.to_string()));
        }
        Ok(())
    }

    pub fn select(&mut self, conditions: &Conditions) -> Result<&mut Self, FactdexError> {
        self.unlocked("select")?;
        self.backend.select(conditions)?;
        Ok(self)
    }

    pub fn reject(&mut self, conditions: &Conditions) -> Result<&mut Self, FactdexError> {
        self.unlocked("reject")?;
        self.backend.reject(conditions)?;
        Ok(self)
    }

    pub fn prefer(&mut self, conditions: &Conditions) -> Result<&mut Self, FactdexError> {
        self.unlocked("prefer")?;
        self.backend.prefer(conditions)?;
        Ok(self)
    }

    // =========================================================================
    // FACTS
    // =========================================================================

    fn facts_mut(&mut self) -> Result<&mut FactMap, FactdexError> {
        let facts = match self.facts.take() {
            Some(facts) => facts,
            None => {
                let facts = self.backend.facts()?;
                if self.downcase_keys {
                    downcase_keys(facts)
                } else {
                    facts
                }
            }
        };
        Ok(self.facts.insert(facts))
    }

    /// The selected facts.
    pub fn to_map(&mut self) -> Result<FactMap, FactdexError> {
        Ok(self.facts_mut()?.clone())
    }

    /// Value at a `::`-delimited path.
    pub fn get(&mut self, path: &str) -> Result<Option<Value>, FactdexError> {
        Ok(mutation::get(self.facts_mut()?, &Path::parse(path)).cloned())
    }

    pub fn exists(&mut self, path: &str) -> Result<bool, FactdexError> {
        Ok(mutation::exists(self.facts_mut()?, &Path::parse(path)))
    }

    /// Set each `path → transform` pair, creating facts that did not exist.
    pub fn replace<P: AsRef<str>>(
        &mut self,
        replacements: impl IntoIterator<Item = (P, Transform)>,
    ) -> Result<&mut Self, FactdexError> {
        let facts = self.facts_mut()?;
        for (path, transform) in replacements {
            mutation::set(facts, &Path::parse(path.as_ref()), &transform)?;
        }
        self.manipulated = true;
        Ok(self)
    }

    /// Remove the value at each path.
    pub fn delete<P: AsRef<str>>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<&mut Self, FactdexError> {
        let facts = self.facts_mut()?;
        for path in paths {
            mutation::delete(facts, &Path::parse(path.as_ref()));
        }
        self.manipulated = true;
        Ok(self)
    }
}

/// Lower-case every key, recursing into maps and lists.
#[must_use]
pub fn downcase_keys(facts: FactMap) -> FactMap {
    facts
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), downcase_value(value)))
        .collect()
}

fn downcase_value(value: Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(downcase_keys(map)),
        Value::List(items) => Value::List(items.into_iter().map(downcase_value).collect()),
        other => other,
    }
}

// =============================================================================
// TESTS
// =============================================================================
