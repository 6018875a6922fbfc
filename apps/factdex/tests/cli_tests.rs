//! End-to-end tests of the CLI commands over a temporary workspace.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use factdex::cli::{SelectSteps, cmd_facts, cmd_index, cmd_nodes, cmd_select, load_index};
use factdex::config::{FileConfig, Overrides, Settings};
use factdex_core::storage::DirectoryRecordSource;
use factdex_core::{FactdexError, Path as FactPath, RecordSource, RedbRecordStore, Value};
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
[index]
file = "index.yaml"
indexed_facts = ["env", "role"]
node_path = "fixtures"

[localfile]
path = "raw/%%NODE%%.yaml"

[parameters]
datacenter = "dc1"

[facts.secret]
plugin = "delete"
"#;

const RAW: &[(&str, &str)] = &[
    ("n1", "env: prod\nrole: web\nsecret: hunter2\n"),
    ("n2", "env: prod\nrole: db\nsecret: hunter2\n"),
    ("n3", "env: dev\nrole: web\n"),
];

fn workspace() -> (TempDir, Settings) {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    for (node, text) in RAW {
        std::fs::write(raw.join(format!("{}.yaml", node)), text).unwrap();
    }
    let settings = settings_for(dir.path(), Overrides::default());
    (dir, settings)
}

fn settings_for(base: &Path, overrides: Overrides) -> Settings {
    let file = FileConfig::parse(CONFIG, base).unwrap();
    Settings::resolve(file, &overrides, |_| None).unwrap()
}

fn hosts() -> Vec<String> {
    RAW.iter().map(|(node, _)| (*node).to_string()).collect()
}

fn steps(select: &[&str], reject: &[&str], prefer: &[&str]) -> SelectSteps {
    let owned = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
    SelectSteps {
        select: owned(select),
        reject: owned(reject),
        prefer: owned(prefer),
    }
}

// =============================================================================
// INDEX
// =============================================================================

#[test]
fn test_index_writes_fixtures_and_index() {
    let (dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();

    let index = load_index(&settings).unwrap();
    assert_eq!(index.nodes(true), vec!["n1", "n2", "n3"]);

    let fixtures = DirectoryRecordSource::new(dir.path().join("fixtures"));
    let n1 = fixtures.load("n1").unwrap();
    assert_eq!(n1.value(Some(&FactPath::parse("env"))), Some(&Value::from("prod")));
    assert_eq!(
        n1.value(Some(&FactPath::parse("datacenter"))),
        Some(&Value::from("dc1"))
    );
    assert_eq!(n1.value(Some(&FactPath::parse("secret"))), None);
}

#[test]
fn test_index_without_hosts_refreshes_existing_nodes() {
    let (_dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();
    cmd_index(&settings, true, &[], true).unwrap();
    assert_eq!(load_index(&settings).unwrap().nodes(true).len(), 3);
}

#[test]
fn test_index_requires_indexed_facts() {
    let (dir, _) = workspace();
    let file = FileConfig::parse("[index]\nfile = \"index.yaml\"\n", dir.path()).unwrap();
    let settings = Settings::resolve(file, &Overrides::default(), |_| None).unwrap();
    let result = cmd_index(&settings, true, &hosts(), false);
    assert!(matches!(result, Err(FactdexError::ConfigError(_))));
}

#[test]
fn test_index_missing_raw_document() {
    let (_dir, settings) = workspace();
    let result = cmd_index(&settings, true, &["ghost".to_string()], false);
    assert!(result.is_err());
}

// =============================================================================
// SELECT / NODES / FACTS
// =============================================================================

#[test]
fn test_select_after_index() {
    let (_dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();

    cmd_select(&settings, true, &steps(&["env=prod"], &["role=db"], &[]), true).unwrap();
    cmd_select(&settings, false, &steps(&[], &[], &["role=web"]), false).unwrap();
}

#[test]
fn test_select_without_match_fails() {
    let (_dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();

    let result = cmd_select(&settings, true, &steps(&["env=qa"], &[], &[]), false);
    assert!(matches!(result, Err(FactdexError::NoMatch { .. })));
}

#[test]
fn test_select_on_unindexed_fact_in_strict_mode() {
    let (dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();

    let strict = settings_for(
        dir.path(),
        Overrides {
            strict_index: true,
            ..Overrides::default()
        },
    );
    assert!(cmd_select(&strict, true, &steps(&["datacenter=dc1"], &[], &[]), false).is_err());
    cmd_select(&settings, true, &steps(&["datacenter=dc1"], &[], &[]), false).unwrap();
}

#[test]
fn test_select_reads_through_record_cache() {
    let (dir, _) = workspace();
    let cached = settings_for(
        dir.path(),
        Overrides {
            record_cache: Some(dir.path().join("records.redb")),
            ..Overrides::default()
        },
    );
    cmd_index(&cached, true, &hosts(), false).unwrap();

    let cache = RedbRecordStore::open(dir.path().join("records.redb")).unwrap();
    assert_eq!(cache.nodes().unwrap(), vec!["n1", "n2", "n3"]);
    drop(cache);

    std::fs::remove_dir_all(dir.path().join("fixtures")).unwrap();
    cmd_select(&cached, true, &steps(&["datacenter=dc1"], &["env=dev"], &[]), true).unwrap();
}

#[test]
fn test_reindex_drops_stale_cached_records() {
    let (dir, _) = workspace();
    let cached = settings_for(
        dir.path(),
        Overrides {
            record_cache: Some(dir.path().join("records.redb")),
            ..Overrides::default()
        },
    );
    cmd_index(&cached, true, &hosts(), false).unwrap();
    cmd_index(&cached, true, &["n1".to_string()], false).unwrap();

    let cache = RedbRecordStore::open(dir.path().join("records.redb")).unwrap();
    assert_eq!(cache.nodes().unwrap(), vec!["n1"]);
}

#[test]
fn test_select_rejects_malformed_condition() {
    let (_dir, settings) = workspace();
    cmd_index(&settings, true, &hosts(), false).unwrap();
    assert!(cmd_select(&settings, true, &steps(&["env"], &[], &[]), false).is_err());
}

#[test]
fn test_nodes_before_index_fails() {
    let (_dir, settings) = workspace();
    assert!(cmd_nodes(&settings, true, false).is_err());
}

#[test]
fn test_facts_to_file() {
    let (dir, settings) = workspace();
    let output = dir.path().join("n3.yaml");
    cmd_facts(&settings, "n3", Some(&output)).unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("env: dev"));
    assert!(text.contains("datacenter: dc1"));
}
