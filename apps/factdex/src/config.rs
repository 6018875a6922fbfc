//! # Configuration
//!
//! `factdex.toml`, parsed with `toml` + `serde`:
//!
//! ```toml
//! strict_index = false
//!
//! [index]
//! file = "index.yaml"
//! indexed_facts = ["env", "role", "os.family"]
//! node_path = "fixtures"
//! record_cache = "records.redb"
//!
//! [localfile]
//! path = "raw/%%NODE%%.yaml"
//!
//! [parameters]
//! datacenter = "dc1"
//!
//! [facts.ssh_keys]
//! regexp = "^ssh.*key$"
//! plugin = "randomize_long_string"
//! ```
//!
//! Relative paths in the file resolve against the file's directory.
//!
//! ## Precedence
//!
//! Command line, then config file, then environment, then default.
//! Strict indexing is on if any of them turns it on.

use factdex_core::{FactMap, FactRule, FactdexError, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the index file.
pub const ENV_INDEX_PATH: &str = "FACTDEX_INDEX_PATH";

/// Environment variable naming the fixture directory.
pub const ENV_FIXTURE_PATH: &str = "FACTDEX_FIXTURE_PATH";

/// Global strict indexing toggle.
pub const ENV_STRICT_INDEX: &str = "FACTDEX_STRICT_INDEX";

pub const DEFAULT_INDEX_FILE: &str = "index.yaml";
pub const DEFAULT_FIXTURE_DIR: &str = "fixtures";

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// FILE FORMAT
// =============================================================================

/// The configuration file as written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub strict_index: Option<bool>,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub localfile: Option<LocalFileSection>,
    /// Facts merged into every fixture before rules run.
    #[serde(default)]
    pub parameters: FactMap,
    /// Fact rules by tag.
    #[serde(default)]
    pub facts: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexSection {
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub indexed_facts: Vec<String>,
    pub node_path: Option<PathBuf>,
    /// redb snapshot of the indexed records, read by selections.
    pub record_cache: Option<PathBuf>,
}

/// Raw fact documents at a `%%NODE%%` path template.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalFileSection {
    pub path: String,
}

impl FileConfig {
    /// Parse configuration text. Relative paths resolve against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, FactdexError> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| FactdexError::ConfigError(e.to_string()))?;
        config.index.file = config.index.file.map(|p| resolve(base_dir, p));
        config.index.node_path = config.index.node_path.map(|p| resolve(base_dir, p));
        config.index.record_cache = config.index.record_cache.map(|p| resolve(base_dir, p));
        if let Some(localfile) = &mut config.localfile {
            localfile.path = resolve(base_dir, PathBuf::from(&localfile.path))
                .to_string_lossy()
                .into_owned();
        }
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, FactdexError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| FactdexError::ConfigError(format!("{}: {}", path.display(), e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FactdexError::ConfigError(format!(
                "{}: {} bytes exceeds maximum allowed {} bytes",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| FactdexError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir)
    }
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub index_file: Option<PathBuf>,
    pub fixture_dir: Option<PathBuf>,
    pub record_cache: Option<PathBuf>,
    pub strict_index: bool,
}

/// Everything a command needs, with precedence applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub index_file: PathBuf,
    pub fixture_dir: PathBuf,
    pub record_cache: Option<PathBuf>,
    pub indexed_facts: Vec<String>,
    pub strict_index: bool,
    pub raw_template: Option<String>,
    pub parameters: FactMap,
    pub rules: Vec<FactRule>,
}

impl Settings {
    /// Resolve settings from the optional config file, the command line and
    /// the process environment.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self, FactdexError> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, overrides, |key| std::env::var(key).ok())
    }

    /// Resolve settings with an explicit environment lookup.
    pub fn resolve(
        file: FileConfig,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FactdexError> {
        let index_file = overrides
            .index_file
            .clone()
            .or(file.index.file)
            .or_else(|| env(ENV_INDEX_PATH).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_FILE));

        let fixture_dir = overrides
            .fixture_dir
            .clone()
            .or(file.index.node_path)
            .or_else(|| env(ENV_FIXTURE_PATH).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE_DIR));

        let record_cache = overrides
            .record_cache
            .clone()
            .or(file.index.record_cache);

        let strict_index = overrides.strict_index
            || file.strict_index.unwrap_or(false)
            || env(ENV_STRICT_INDEX).is_some_and(|v| is_true(&v));

        let rules = file
            .facts
            .iter()
            .map(|(tag, table)| FactRule::from_table(tag.as_str(), table))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            index_file,
            fixture_dir,
            record_cache,
            indexed_facts: file.index.indexed_facts,
            strict_index,
            raw_template: file.localfile.map(|l| l.path),
            parameters: file.parameters,
            rules,
        })
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
