//! # Fixture Assembly
//!
//! Turns a node name into a sanitized node record:
//! 1. load the raw facts from the first record source that has them
//! 2. merge extra parameters over the top-level facts
//! 3. run the configured fact rules
//!
//! The result is what gets written to the fixture directory and indexed.

use crate::plugins::{FactRule, PluginRegistry, apply_rules};
use crate::record::FactRecord;
use crate::storage::{RecordSource, validate_node_name};
use crate::{FactMap, FactdexError};

/// Builds sanitized fixtures from raw fact sources.
pub struct FixtureBuilder {
    sources: Vec<Box<dyn RecordSource>>,
    registry: PluginRegistry,
    rules: Vec<FactRule>,
    parameters: FactMap,
}

impl std::fmt::Debug for FixtureBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureBuilder")
            .field("sources", &self.sources.len())
            .field("registry", &self.registry)
            .field("rules", &self.rules)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl FixtureBuilder {
    /// A builder with no sources and no rules.
    #[must_use]
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            sources: Vec::new(),
            registry,
            rules: Vec::new(),
            parameters: FactMap::new(),
        }
    }

    /// Add a record source. Sources are tried in the order they were added.
    #[must_use]
    pub fn with_source(mut self, source: impl RecordSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: Vec<FactRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Facts merged over every loaded record, before rules run.
    #[must_use]
    pub fn with_parameters(mut self, parameters: FactMap) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[FactRule] {
        &self.rules
    }

    /// Build the sanitized record of `node`.
    pub fn build(&self, node: &str) -> Result<FactRecord, FactdexError> {
        validate_node_name(node)?;
        let mut record = self.load(node)?;
        for (name, value) in &self.parameters {
            record.put_fact(FactRecord::new(name.clone(), Some(value.clone())));
        }
        self.sanitize(&mut record)?;
        Ok(record)
    }

    /// Run the fact rules over an already loaded record.
    pub fn sanitize(&self, record: &mut FactRecord) -> Result<(), FactdexError> {
        apply_rules(&self.registry, record, &self.rules)
    }

    /// Load from the first source that has the node. When every source
    /// fails, the last failure is returned.
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.load(node) {
                Ok(record) => return Ok(record),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| FactdexError::ConfigError("No fact sources configured".to_string())))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use crate::storage::{DirectoryRecordSource, MemoryRecordSource};

    fn raw_source() -> MemoryRecordSource {
        let mut facts = FactMap::new();
        facts.insert("hostname".to_string(), Value::from("web1"));
        facts.insert("ec2_userdata".to_string(), Value::from("password=hunter2"));
        [FactRecord::from_map("web1.example.net", facts)]
            .into_iter()
            .collect()
    }

    #[test]
    fn build_merges_parameters_and_applies_rules() {
        let mut parameters = FactMap::new();
        parameters.insert("role".to_string(), Value::from("web"));

        let builder = FixtureBuilder::new(PluginRegistry::with_builtins())
            .with_source(raw_source())
            .with_parameters(parameters)
            .with_rules(vec![FactRule::new("ec2_userdata", "delete")]);

        let record = builder.build("web1.example.net").expect("build");
        let facts = record.facts().expect("facts");
        assert_eq!(facts.get("role"), Some(&Value::from("web")));
        assert!(!facts.contains_key("ec2_userdata"));
        assert_eq!(record.name(), "web1.example.net");
    }

    #[test]
    fn falls_through_to_next_source() {
        let builder = FixtureBuilder::new(PluginRegistry::with_builtins())
            .with_source(MemoryRecordSource::new())
            .with_source(raw_source());
        assert!(builder.build("web1.example.net").is_ok());

        assert!(matches!(
            builder.build("db1.example.net"),
            Err(FactdexError::RecordNotFound(_))
        ));
    }

    #[test]
    fn rejects_bad_node_names_and_missing_sources() {
        let builder = FixtureBuilder::new(PluginRegistry::with_builtins()).with_source(raw_source());
        assert!(matches!(
            builder.build("../etc/passwd"),
            Err(FactdexError::InvalidNodeName(_))
        ));

        let empty = FixtureBuilder::new(PluginRegistry::with_builtins());
        assert!(matches!(
            empty.build("web1.example.net"),
            Err(FactdexError::ConfigError(_))
        ));
    }

    #[test]
    fn built_fixture_writes_sorted_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let builder = FixtureBuilder::new(PluginRegistry::with_builtins()).with_source(raw_source());
        let record = builder.build("web1.example.net").expect("build");

        let fixtures = DirectoryRecordSource::new(dir.path());
        let path = fixtures.write(&record).expect("write");
        let text = std::fs::read_to_string(path).expect("read");
        assert!(text.find("ec2_userdata").expect("key") < text.find("hostname").expect("key"));
        assert_eq!(fixtures.load("web1.example.net").expect("load"), record);
    }
}
