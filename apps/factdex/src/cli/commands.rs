//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Settings;
use factdex_core::formats::to_yaml;
use factdex_core::storage::{DirectoryRecordSource, FileIndexSource, TemplateRecordSource};
use factdex_core::{
    Conditions, FactIndex, FactMap, FactRecord, FactSession, FactdexError, FixtureBuilder,
    PluginRegistry, RecordSource, RedbRecordStore, SelectionEngine, Value, canonical_checksum,
    canonical_crypto_hash,
};
use std::path::Path;

/// Print a JSON document.
fn print_json(output: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

// =============================================================================
// INDEX COMMAND
// =============================================================================

/// Build fixtures for `hosts` and rewrite the index over them.
///
/// Without hosts, the nodes of the current index are refreshed.
pub fn cmd_index(
    settings: &Settings,
    json_mode: bool,
    hosts: &[String],
    quick: bool,
) -> Result<(), FactdexError> {
    if settings.indexed_facts.is_empty() {
        return Err(FactdexError::ConfigError(
            "index.indexed_facts must list at least one fact".to_string(),
        ));
    }

    let nodes = if hosts.is_empty() {
        load_index(settings)?.nodes(true)
    } else {
        hosts.to_vec()
    };
    if nodes.is_empty() {
        return Err(FactdexError::ConfigError("No nodes to index".to_string()));
    }

    let fixtures = DirectoryRecordSource::new(&settings.fixture_dir);
    let builder = fixture_builder(settings);
    let mut records = Vec::with_capacity(nodes.len());
    let mut rebuilt = 0usize;

    for node in &nodes {
        let existing = fixtures.path_for(node)?;
        if quick && existing.is_file() {
            tracing::debug!("Reusing fixture {}", existing.display());
            records.push(fixtures.load(node)?);
            continue;
        }
        let record = builder.build(node)?;
        let path = fixtures.write(&record)?;
        tracing::info!("Wrote fixture {}", path.display());
        records.push(record);
        rebuilt += 1;
    }

    let mut index = FactIndex::new();
    index.reindex(&settings.indexed_facts, &records);
    save_index(settings, &index)?;
    if let Some(path) = &settings.record_cache {
        refresh_record_cache(path, &records)?;
    }

    tracing::info!(
        "Indexed {} facts over {} nodes into {}",
        settings.indexed_facts.len(),
        records.len(),
        settings.index_file.display()
    );

    if json_mode {
        print_json(&serde_json::json!({
            "index_file": settings.index_file.to_string_lossy(),
            "fixture_dir": settings.fixture_dir.to_string_lossy(),
            "nodes": records.len(),
            "rebuilt": rebuilt,
            "indexed_facts": settings.indexed_facts,
        }));
    } else {
        println!(
            "Indexed {} nodes ({} fixtures rebuilt)",
            records.len(),
            rebuilt
        );
    }
    Ok(())
}

// =============================================================================
// FACTS COMMAND
// =============================================================================

/// Print or write the sanitized facts of one host.
pub fn cmd_facts(
    settings: &Settings,
    hostname: &str,
    output: Option<&Path>,
) -> Result<(), FactdexError> {
    let record = fixture_builder(settings).build(hostname)?;
    let text = fixture_yaml(&record)?;

    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .map_err(|e| FactdexError::IoError(format!("{}: {}", path.display(), e)))?;
            tracing::info!("Wrote facts of {} to {}", hostname, path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

// =============================================================================
// SELECT COMMAND
// =============================================================================

/// Raw `attribute=value` conditions per operation, applied select → reject
/// → prefer.
#[derive(Debug, Clone, Default)]
pub struct SelectSteps {
    pub select: Vec<String>,
    pub reject: Vec<String>,
    pub prefer: Vec<String>,
}

/// Run a selection and report the chosen node.
pub fn cmd_select(
    settings: &Settings,
    json_mode: bool,
    steps: &SelectSteps,
    show_facts: bool,
) -> Result<(), FactdexError> {
    let select = Conditions::parse_all(&steps.select)?;
    let reject = Conditions::parse_all(&steps.reject)?;
    let prefer = Conditions::parse_all(&steps.prefer)?;

    let index = load_index(settings)?;
    let outcome = match &settings.record_cache {
        Some(path) => {
            tracing::debug!("Reading records from cache {}", path.display());
            let cache = RedbRecordStore::open(path)?;
            run_selection(index, cache, settings.strict_index, [&select, &reject, &prefer])?
        }
        None => {
            let fixtures = DirectoryRecordSource::new(&settings.fixture_dir);
            run_selection(index, fixtures, settings.strict_index, [&select, &reject, &prefer])?
        }
    };
    let SelectionOutcome {
        node,
        eligible,
        facts,
    } = outcome;

    if json_mode {
        let mut output = serde_json::json!({
            "node": node,
            "eligible": eligible,
        });
        if show_facts {
            output["facts"] = serde_json::to_value(Value::Map(facts))
                .map_err(|e| FactdexError::SerializationError(e.to_string()))?;
        }
        print_json(&output);
        return Ok(());
    }

    println!("{}", node);
    if show_facts {
        print!("{}", to_yaml(&Value::Map(facts))?);
    }
    Ok(())
}

/// Result of a selection session.
struct SelectionOutcome {
    node: String,
    eligible: Vec<String>,
    facts: FactMap,
}

/// Apply select, reject and prefer over `source` and read the chosen facts.
fn run_selection<S: RecordSource>(
    index: FactIndex,
    source: S,
    strict: bool,
    [select, reject, prefer]: [&Conditions; 3],
) -> Result<SelectionOutcome, FactdexError> {
    let engine = SelectionEngine::new(index, source, strict);
    let mut session = FactSession::new(engine);

    session.select(select)?.reject(reject)?.prefer(prefer)?;
    let facts = session.to_map()?;

    let engine = session.backend();
    let stats = engine.stats();
    if !stats.indexed_on_demand.is_empty() {
        tracing::debug!(
            "Indexed on demand: {} ({} records loaded)",
            stats.indexed_on_demand.join(", "),
            stats.records_loaded
        );
    }
    Ok(SelectionOutcome {
        node: engine.eligible().first().cloned().unwrap_or_default(),
        eligible: engine.eligible().to_vec(),
        facts,
    })
}

// =============================================================================
// NODES COMMAND
// =============================================================================

/// List the indexed nodes.
pub fn cmd_nodes(settings: &Settings, json_mode: bool, full: bool) -> Result<(), FactdexError> {
    let nodes = load_index(settings)?.nodes(!full);

    if json_mode {
        print_json(&serde_json::json!({ "nodes": nodes }));
        return Ok(());
    }
    for node in nodes {
        println!("{}", node);
    }
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print checksums of the canonical index.
pub fn cmd_hash(settings: &Settings, json_mode: bool) -> Result<(), FactdexError> {
    let index = load_index(settings)?;
    let hash = canonical_crypto_hash(&index)?;
    let checksum = canonical_checksum(&index)?;

    if json_mode {
        print_json(&serde_json::json!({
            "algorithm": "blake3",
            "hash": hash,
            "checksum": format!("{:016x}", checksum),
            "attributes": index.attribute_count(),
        }));
        return Ok(());
    }

    println!("BLAKE3:   {}", hash);
    println!("Checksum: {:016x}", checksum);
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

/// Fixture builder from the configured raw source, parameters and rules.
pub fn fixture_builder(settings: &Settings) -> FixtureBuilder {
    let mut builder = FixtureBuilder::new(PluginRegistry::with_builtins())
        .with_parameters(settings.parameters.clone())
        .with_rules(settings.rules.clone());
    if let Some(template) = &settings.raw_template {
        builder = builder.with_source(TemplateRecordSource::new(template.as_str()));
    }
    builder
}

/// Sorted YAML of a fixture's facts.
pub fn fixture_yaml(record: &FactRecord) -> Result<String, FactdexError> {
    let facts = record.facts().cloned().unwrap_or_default();
    to_yaml(&Value::Map(facts))
}

/// Replace the contents of the record cache with `records`.
fn refresh_record_cache(path: &Path, records: &[FactRecord]) -> Result<(), FactdexError> {
    let mut cache = RedbRecordStore::open(path)?;
    let keep: std::collections::BTreeSet<&str> = records.iter().map(FactRecord::name).collect();
    for node in cache.nodes()? {
        if !keep.contains(node.as_str()) {
            cache.remove(&node)?;
        }
    }
    cache.put_batch(records)?;
    tracing::info!("Cached {} records in {}", records.len(), path.display());
    Ok(())
}

/// Load the configured index file.
pub fn load_index(settings: &Settings) -> Result<FactIndex, FactdexError> {
    let location = settings.index_file.to_string_lossy();
    FactIndex::load(&FileIndexSource::new(), &location)
}

/// Write the configured index file.
pub fn save_index(settings: &Settings, index: &FactIndex) -> Result<(), FactdexError> {
    let location = settings.index_file.to_string_lossy();
    index.save(&mut FileIndexSource::new(), &location)
}
