//! # Selection Engine
//!
//! Narrows the set of eligible nodes with index lookups.
//!
//! The engine owns:
//! - the `FactIndex`, mutated in place when an attribute is indexed on demand
//! - a record source and a per-node record cache
//! - the eligible node list, seeded from the index's node list
//! - the selected record, memoized on the first `facts()` call
//!
//! ## Lazy indexing
//!
//! A condition on an attribute that is not yet indexed makes the engine load
//! the records of the nodes that are eligible *at that moment* and index the
//! attribute over them. Nodes filtered out earlier are never looked at. With
//! strict mode on, the engine refuses instead and leaves every piece of state
//! untouched.
//!
//! Unlike the rest of the core, reads here mutate state: which attributes are
//! indexed depends on which conditions were applied so far.

use crate::index::FactIndex;
use crate::primitives::NODES_KEY;
use crate::query::{Condition, Conditions, Query, QueryType};
use crate::record::FactRecord;
use crate::storage::RecordSource;
use crate::FactdexError;
use std::collections::{BTreeMap, BTreeSet};

/// What the engine did behind the scenes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStats {
    /// Attributes indexed on demand, in the order they were first referenced.
    pub indexed_on_demand: Vec<String>,
    /// Records fetched from the record source (cache misses).
    pub records_loaded: usize,
}

/// Narrows the nodes of a `FactIndex` down to the one whose facts are used.
///
/// The engine owns the index and extends it in place when a condition names
/// an attribute that is not indexed yet (unless strict). Records loaded for
/// that are cached per node. The record returned by `facts()` is fixed by
/// the first call.
#[derive(Debug)]
pub struct SelectionEngine<S: RecordSource> {
    index: FactIndex,
    source: S,
    strict: bool,
    eligible: Vec<String>,
    cache: BTreeMap<String, FactRecord>,
    selected: Option<FactRecord>,
    stats: SelectionStats,
}

impl<S: RecordSource> SelectionEngine<S> {
    /// Start an unconstrained selection over every node of `index`.
    pub fn new(index: FactIndex, source: S, strict: bool) -> Self {
        let eligible = index.nodes(true);
        Self {
            index,
            source,
            strict,
            eligible,
            cache: BTreeMap::new(),
            selected: None,
            stats: SelectionStats::default(),
        }
    }

    /// Eligible nodes, in current preference order.
    #[must_use]
    pub fn eligible(&self) -> &[String] {
        &self.eligible
    }

    #[must_use]
    pub fn index(&self) -> &FactIndex {
        &self.index
    }

    /// Give the (possibly extended) index back.
    #[must_use]
    pub fn into_index(self) -> FactIndex {
        self.index
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    #[must_use]
    pub fn stats(&self) -> &SelectionStats {
        &self.stats
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Keep only nodes in the bucket of every condition.
    ///
    /// Fails with `NoMatch` when a condition's value has no bucket or the
    /// intersection is empty. Conditions applied before the failing one stay
    /// applied.
    pub fn select(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        self.check_strict(conditions)?;
        for condition in conditions {
            self.ensure_indexed(&condition.attribute)?;
            let bucket: BTreeSet<&str> = self
                .index
                .bucket(&condition.attribute, &condition.value_key())
                .ok_or_else(|| no_match(condition))?
                .iter()
                .map(String::as_str)
                .collect();

            let narrowed: Vec<String> = self
                .eligible
                .iter()
                .filter(|node| bucket.contains(node.as_str()))
                .cloned()
                .collect();
            if narrowed.is_empty() {
                return Err(no_match(condition));
            }
            self.eligible = narrowed;
        }
        Ok(())
    }

    /// Drop nodes in the bucket of any condition.
    ///
    /// A missing bucket excludes nothing. Fails with `NoMatch` when the
    /// eligible set is or becomes empty; on failure nothing is committed.
    pub fn reject(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        self.check_strict(conditions)?;
        let mut remaining = self.eligible.clone();
        for condition in conditions {
            if remaining.is_empty() {
                return Err(no_match(condition));
            }
            self.ensure_indexed(&condition.attribute)?;
            if let Some(bucket) = self.index.bucket(&condition.attribute, &condition.value_key()) {
                let bucket: BTreeSet<&str> = bucket.iter().map(String::as_str).collect();
                remaining.retain(|node| !bucket.contains(node.as_str()));
                if remaining.is_empty() {
                    return Err(no_match(condition));
                }
            }
        }
        self.eligible = remaining;
        Ok(())
    }

    /// Move nodes in each condition's bucket to the front.
    ///
    /// Promoted nodes keep bucket order, the rest keep their previous order.
    /// Membership never changes. A missing bucket is a no-op.
    pub fn prefer(&mut self, conditions: &Conditions) -> Result<(), FactdexError> {
        self.check_strict(conditions)?;
        for condition in conditions {
            self.ensure_indexed(&condition.attribute)?;
            let Some(bucket) = self.index.bucket(&condition.attribute, &condition.value_key())
            else {
                continue;
            };

            let current: BTreeSet<&str> = self.eligible.iter().map(String::as_str).collect();
            let mut promoted: Vec<String> = Vec::new();
            let mut seen = BTreeSet::new();
            for node in bucket {
                if current.contains(node.as_str()) && seen.insert(node.as_str()) {
                    promoted.push(node.clone());
                }
            }
            let rest = self
                .eligible
                .iter()
                .filter(|node| !seen.contains(node.as_str()))
                .cloned();
            let reordered: Vec<String> = promoted.into_iter().chain(rest).collect();
            self.eligible = reordered;
        }
        Ok(())
    }

    /// Run every step of `query` in order.
    pub fn apply(&mut self, query: &Query) -> Result<(), FactdexError> {
        for (query_type, conditions) in &query.steps {
            match query_type {
                QueryType::Select => self.select(conditions)?,
                QueryType::Reject => self.reject(conditions)?,
                QueryType::Prefer => self.prefer(conditions)?,
            }
        }
        Ok(())
    }

    /// The record of the first eligible node.
    ///
    /// Computed once; later changes to the eligible set do not affect it.
    pub fn facts(&mut self) -> Result<&FactRecord, FactdexError> {
        let record = match self.selected.take() {
            Some(record) => record,
            None => {
                let node = self.eligible.first().ok_or_else(|| FactdexError::NoMatch {
                    attribute: NODES_KEY.to_string(),
                    value: "any".to_string(),
                })?;
                match self.cache.get(node) {
                    Some(record) => record.clone(),
                    None => {
                        let record = self.source.load(node)?;
                        self.stats.records_loaded += 1;
                        record
                    }
                }
            }
        };
        Ok(self.selected.insert(record))
    }

    // =========================================================================
    // LAZY INDEXING
    // =========================================================================

    /// In strict mode, refuse before anything is applied if any attribute of
    /// the call is not indexed.
    fn check_strict(&self, conditions: &Conditions) -> Result<(), FactdexError> {
        if !self.strict {
            return Ok(());
        }
        match conditions
            .iter()
            .find(|c| !self.index.is_indexed(&c.attribute))
        {
            Some(condition) => Err(FactdexError::StrictIndexViolation {
                attribute: condition.attribute.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Index `attribute` over the currently eligible nodes unless it already
    /// is indexed.
    fn ensure_indexed(&mut self, attribute: &str) -> Result<(), FactdexError> {
        if self.index.is_indexed(attribute) {
            return Ok(());
        }
        if self.strict {
            return Err(FactdexError::StrictIndexViolation {
                attribute: attribute.to_string(),
            });
        }

        for node in &self.eligible {
            if !self.cache.contains_key(node) {
                let record = self.source.load(node)?;
                self.stats.records_loaded += 1;
                self.cache.insert(node.clone(), record);
            }
        }

        let records = self.eligible.iter().filter_map(|node| self.cache.get(node));
        self.index.add_iter(attribute, records);
        self.stats.indexed_on_demand.push(attribute.to_string());
        Ok(())
    }
}

fn no_match(condition: &Condition) -> FactdexError {
    FactdexError::NoMatch {
        attribute: condition.attribute.clone(),
        value: condition.value_key(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordSource;
    use crate::{FactMap, Value};

    fn node(name: &str, env: &str, role: &str) -> FactRecord {
        let mut facts = FactMap::new();
        facts.insert("env".to_string(), Value::from(env));
        facts.insert("role".to_string(), Value::from(role));
        FactRecord::from_map(name, facts)
    }

    fn source() -> MemoryRecordSource {
        [
            node("n1", "prod", "db"),
            node("n2", "prod", "web"),
            node("n3", "dev", "db"),
        ]
        .into_iter()
        .collect()
    }

    /// An index that only knows the node list.
    fn bare_index() -> FactIndex {
        let mut index = FactIndex::new();
        index.set_nodes(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()]);
        index
    }

    fn full_index() -> FactIndex {
        let mut index = FactIndex::new();
        index.reindex(&["env", "role"], &source().records());
        index
    }

    fn one(attribute: &str, value: &str) -> Conditions {
        Conditions::new().and(attribute, value)
    }

    #[test]
    fn starts_with_index_node_list() {
        let engine = SelectionEngine::new(bare_index(), source(), false);
        assert_eq!(engine.eligible(), ["n1", "n2", "n3"]);
    }

    #[test]
    fn select_intersects() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.select(&one("env", "prod")).expect("select");
        assert_eq!(engine.eligible(), ["n1", "n2"]);
        engine.select(&one("role", "db")).expect("select");
        assert_eq!(engine.eligible(), ["n1"]);
    }

    #[test]
    fn select_missing_bucket_fails() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        let result = engine.select(&one("env", "qa"));
        assert!(matches!(
            result,
            Err(FactdexError::NoMatch { attribute, value }) if attribute == "env" && value == "qa"
        ));
        assert_eq!(engine.eligible().len(), 3);
    }

    #[test]
    fn select_empty_intersection_fails_after_earlier_conditions() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        let conditions = Conditions::new().and("env", "dev").and("role", "web");
        assert!(matches!(
            engine.select(&conditions),
            Err(FactdexError::NoMatch { .. })
        ));
        // The first condition stays applied
        assert_eq!(engine.eligible(), ["n3"]);
    }

    #[test]
    fn reject_is_set_difference() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.reject(&one("role", "db")).expect("reject");
        assert_eq!(engine.eligible(), ["n2"]);
    }

    #[test]
    fn reject_missing_bucket_is_noop() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.reject(&one("role", "cache")).expect("reject");
        assert_eq!(engine.eligible().len(), 3);
    }

    #[test]
    fn reject_emptying_set_fails_without_commit() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        let conditions = Conditions::new().and("env", "prod").and("env", "dev");
        assert!(matches!(
            engine.reject(&conditions),
            Err(FactdexError::NoMatch { .. })
        ));
        assert_eq!(engine.eligible().len(), 3);
    }

    #[test]
    fn reject_on_empty_set_fails() {
        let mut engine = SelectionEngine::new(FactIndex::new(), source(), false);
        assert!(engine.eligible().is_empty());
        assert!(matches!(
            engine.reject(&one("role", "cache")),
            Err(FactdexError::NoMatch { .. })
        ));
    }

    #[test]
    fn prefer_promotes_and_keeps_cardinality() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.prefer(&one("env", "dev")).expect("prefer");
        assert_eq!(engine.eligible(), ["n3", "n1", "n2"]);

        engine.prefer(&one("role", "web")).expect("prefer");
        assert_eq!(engine.eligible(), ["n2", "n3", "n1"]);
    }

    #[test]
    fn prefer_ignores_bucket_members_outside_eligible_set() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.select(&one("env", "prod")).expect("select");
        engine.prefer(&one("role", "db")).expect("prefer");
        assert_eq!(engine.eligible(), ["n1", "n2"]);
    }

    #[test]
    fn prefer_missing_bucket_is_noop() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.prefer(&one("env", "qa")).expect("prefer");
        assert_eq!(engine.eligible(), ["n1", "n2", "n3"]);
    }

    #[test]
    fn lazy_indexing_happens_once_per_attribute() {
        let mut engine = SelectionEngine::new(bare_index(), source(), false);
        assert!(!engine.index().is_indexed("env"));

        engine.prefer(&one("env", "dev")).expect("prefer");
        assert!(engine.index().is_indexed("env"));
        assert_eq!(engine.stats().records_loaded, 3);

        engine.select(&one("env", "dev")).expect("select");
        assert_eq!(engine.stats().indexed_on_demand, vec!["env"]);
        assert_eq!(engine.stats().records_loaded, 3);
    }

    #[test]
    fn lazy_indexing_scoped_to_current_eligible_set() {
        // Only n3 carries "tier"
        let mut src = source();
        let mut facts = src
            .load("n3")
            .expect("n3")
            .facts()
            .cloned()
            .unwrap_or_default();
        facts.insert("tier".to_string(), Value::from("gold"));
        src.insert(FactRecord::from_map("n3", facts));

        let mut engine = SelectionEngine::new(full_index(), src, false);
        engine.select(&one("env", "prod")).expect("select");

        // n3 was filtered out before "tier" was referenced, so it is never scanned
        assert!(matches!(
            engine.select(&one("tier", "gold")),
            Err(FactdexError::NoMatch { .. })
        ));
        assert!(engine.index().is_indexed("tier"));
        assert!(engine.index().bucket("tier", "gold").is_none());
        assert_eq!(engine.stats().records_loaded, 2);
    }

    #[test]
    fn cached_records_are_reused() {
        let mut engine = SelectionEngine::new(bare_index(), source(), false);
        engine.prefer(&one("env", "dev")).expect("prefer");
        engine.prefer(&one("role", "db")).expect("prefer");
        assert_eq!(engine.stats().records_loaded, 3);

        engine.facts().expect("facts");
        assert_eq!(engine.stats().records_loaded, 3);
    }

    #[test]
    fn strict_mode_blocks_and_leaves_state() {
        let mut engine = SelectionEngine::new(bare_index(), source(), true);
        let result = engine.select(&one("env", "prod"));

        assert!(matches!(
            result,
            Err(FactdexError::StrictIndexViolation { attribute }) if attribute == "env"
        ));
        assert!(!engine.index().is_indexed("env"));
        assert_eq!(engine.eligible(), ["n1", "n2", "n3"]);
        assert_eq!(engine.stats().records_loaded, 0);
    }

    #[test]
    fn strict_mode_checks_all_conditions_first() {
        let mut engine = SelectionEngine::new(full_index(), source(), true);
        let conditions = Conditions::new().and("env", "prod").and("kernel", "Linux");

        assert!(matches!(
            engine.select(&conditions),
            Err(FactdexError::StrictIndexViolation { attribute }) if attribute == "kernel"
        ));
        assert_eq!(engine.eligible().len(), 3);
    }

    #[test]
    fn strict_mode_allows_indexed_attributes() {
        let mut engine = SelectionEngine::new(full_index(), source(), true);
        engine.select(&one("role", "db")).expect("select");
        assert_eq!(engine.eligible(), ["n1", "n3"]);
    }

    #[test]
    fn facts_returns_first_and_is_memoized() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        engine.prefer(&one("env", "dev")).expect("prefer");
        assert_eq!(engine.facts().expect("facts").name(), "n3");

        engine.select(&one("env", "prod")).expect("select");
        assert_eq!(engine.facts().expect("facts").name(), "n3");
    }

    #[test]
    fn facts_on_empty_set_fails() {
        let mut engine = SelectionEngine::new(FactIndex::new(), source(), false);
        assert!(matches!(engine.facts(), Err(FactdexError::NoMatch { .. })));
    }

    #[test]
    fn missing_record_surfaces() {
        let mut engine = SelectionEngine::new(bare_index(), MemoryRecordSource::new(), false);
        assert!(matches!(
            engine.select(&one("env", "prod")),
            Err(FactdexError::RecordNotFound(_))
        ));
        assert!(!engine.index().is_indexed("env"));
    }

    #[test]
    fn apply_runs_steps_in_order() {
        let mut engine = SelectionEngine::new(full_index(), source(), false);
        let query = Query::new()
            .select(one("env", "prod"))
            .prefer(one("role", "web"));
        engine.apply(&query).expect("apply");
        assert_eq!(engine.eligible(), ["n2", "n1"]);
    }
}
