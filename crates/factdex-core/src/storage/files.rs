//! Filesystem-backed sources: one YAML document per node, and index files.

use super::{IndexSource, RecordSource, validate_node_name};
use crate::formats::yaml;
use crate::primitives::{FIXTURE_EXTENSION, MAX_DOCUMENT_SIZE, NODE_PLACEHOLDER};
use crate::record::FactRecord;
use crate::{FactMap, FactdexError, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Read a document, refusing oversized files before reading them.
///
/// `missing` builds the error for a file that does not exist.
fn read_document(
    path: &Path,
    missing: impl FnOnce() -> FactdexError,
) -> Result<String, FactdexError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(FactdexError::IoError(format!("{}: {}", path.display(), e))),
    };
    if !metadata.is_file() {
        return Err(missing());
    }
    if metadata.len() > MAX_DOCUMENT_SIZE {
        return Err(FactdexError::IoError(format!(
            "{}: {} bytes exceeds maximum allowed {} bytes",
            path.display(),
            metadata.len(),
            MAX_DOCUMENT_SIZE
        )));
    }
    fs::read_to_string(path).map_err(|e| FactdexError::IoError(format!("{}: {}", path.display(), e)))
}

fn write_document(path: &Path, text: &str) -> Result<(), FactdexError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| FactdexError::IoError(format!("{}: {}", parent.display(), e)))?;
    }
    fs::write(path, text).map_err(|e| FactdexError::IoError(format!("{}: {}", path.display(), e)))
}

fn load_from(
    path: &Path,
    node: &str,
    parse: fn(&str) -> Result<FactMap, FactdexError>,
) -> Result<FactRecord, FactdexError> {
    let text = read_document(path, || FactdexError::RecordNotFound(node.to_string()))?;
    Ok(FactRecord::from_map(node, parse(&text)?))
}

// =============================================================================
// FIXTURE DIRECTORY
// =============================================================================

/// A directory of `<node>.yaml` fact documents.
#[derive(Debug, Clone)]
pub struct DirectoryRecordSource {
    dir: PathBuf,
}

impl DirectoryRecordSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory, as given.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the document of `node`.
    pub fn path_for(&self, node: &str) -> Result<PathBuf, FactdexError> {
        validate_node_name(node)?;
        Ok(self.dir.join(format!("{}.{}", node, FIXTURE_EXTENSION)))
    }

    /// Node names with a document in the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, FactdexError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| FactdexError::IoError(format!("{}: {}", self.dir.display(), e)))?;
        let mut nodes = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| FactdexError::IoError(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(FIXTURE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_node_name(stem).is_ok() {
                    nodes.push(stem.to_string());
                }
            }
        }
        nodes.sort();
        Ok(nodes)
    }

    /// Load every listed record, sorted by node name.
    pub fn load_all(&self) -> Result<Vec<FactRecord>, FactdexError> {
        self.list()?.iter().map(|node| self.load(node)).collect()
    }

    /// Write a node record as a sorted YAML document. A record without a
    /// value is written as an empty map.
    pub fn write(&self, record: &FactRecord) -> Result<PathBuf, FactdexError> {
        let path = self.path_for(record.name())?;
        let facts = record.facts().cloned().unwrap_or_else(FactMap::new);
        write_document(&path, &yaml::to_yaml(&Value::Map(facts))?)?;
        Ok(path)
    }
}

impl RecordSource for DirectoryRecordSource {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        load_from(&self.path_for(node)?, node, yaml::parse_fixture)
    }
}

// =============================================================================
// PATH TEMPLATE
// =============================================================================

/// Fact documents at a path template where `%%NODE%%` stands for the node.
#[derive(Debug, Clone)]
pub struct TemplateRecordSource {
    template: String,
}

impl TemplateRecordSource {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Path of the document of `node`.
    pub fn path_for(&self, node: &str) -> Result<PathBuf, FactdexError> {
        validate_node_name(node)?;
        Ok(PathBuf::from(self.template.replace(NODE_PLACEHOLDER, node)))
    }
}

impl RecordSource for TemplateRecordSource {
    fn load(&self, node: &str) -> Result<FactRecord, FactdexError> {
        load_from(&self.path_for(node)?, node, yaml::parse_facts)
    }
}

// =============================================================================
// INDEX FILES
// =============================================================================

/// Index documents on the local filesystem. Relative locations resolve
/// against the base directory.
#[derive(Debug, Clone, Default)]
pub struct FileIndexSource {
    base: Option<PathBuf>,
}

impl FileIndexSource {
    /// Locations are used as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative locations resolve against `base`.
    #[must_use]
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl IndexSource for FileIndexSource {
    fn fetch(&self, location: &str) -> Result<String, FactdexError> {
        read_document(&self.resolve(location), || {
            FactdexError::IndexSourceNotFound(location.to_string())
        })
    }

    fn store(&mut self, location: &str, text: &str) -> Result<(), FactdexError> {
        write_document(&self.resolve(location), text)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FactIndex;
    use tempfile::tempdir;

    #[test]
    fn directory_write_then_load() {
        let temp = tempdir().expect("temp dir");
        let source = DirectoryRecordSource::new(temp.path());

        let mut facts = FactMap::new();
        facts.insert("env".to_string(), Value::from("prod"));
        source
            .write(&FactRecord::from_map("web1.example.net", facts.clone()))
            .expect("write");

        let loaded = source.load("web1.example.net").expect("load");
        assert_eq!(loaded.facts(), Some(&facts));
        assert_eq!(source.list().expect("list"), vec!["web1.example.net"]);
    }

    #[test]
    fn directory_keeps_fact_named_values() {
        let temp = tempdir().expect("temp dir");
        let source = DirectoryRecordSource::new(temp.path());

        let mut nested = FactMap::new();
        nested.insert("a".to_string(), Value::from("1"));
        let mut facts = FactMap::new();
        facts.insert("env".to_string(), Value::from("prod"));
        facts.insert("values".to_string(), Value::Map(nested));
        source
            .write(&FactRecord::from_map("n1", facts.clone()))
            .expect("write");

        assert_eq!(source.load("n1").expect("load").facts(), Some(&facts));

        let mut index = FactIndex::new();
        index.set_nodes(vec!["n1".to_string()]);
        let mut engine = crate::SelectionEngine::new(index, source, false);
        engine
            .select(&crate::Conditions::new().and("env", "prod"))
            .expect("select");
        assert_eq!(engine.eligible(), ["n1"]);
    }

    #[test]
    fn directory_missing_record() {
        let temp = tempdir().expect("temp dir");
        let source = DirectoryRecordSource::new(temp.path());
        assert!(matches!(
            source.load("ghost"),
            Err(FactdexError::RecordNotFound(node)) if node == "ghost"
        ));
    }

    #[test]
    fn directory_refuses_escaping_names() {
        let temp = tempdir().expect("temp dir");
        let source = DirectoryRecordSource::new(temp.path());
        assert!(matches!(
            source.load("../secret"),
            Err(FactdexError::InvalidNodeName(_))
        ));
    }

    #[test]
    fn directory_list_skips_other_files() {
        let temp = tempdir().expect("temp dir");
        fs::write(temp.path().join("b.yaml"), "a: 1\n").expect("write");
        fs::write(temp.path().join("a.yaml"), "a: 2\n").expect("write");
        fs::write(temp.path().join("notes.txt"), "x").expect("write");

        let source = DirectoryRecordSource::new(temp.path());
        assert_eq!(source.list().expect("list"), vec!["a", "b"]);
        assert_eq!(source.load_all().expect("load").len(), 2);
    }

    #[test]
    fn template_substitutes_node() {
        let temp = tempdir().expect("temp dir");
        fs::write(
            temp.path().join("facts-web1.yaml"),
            "--- !ruby/object:Puppet::Node::Facts\nname: web1\nvalues:\n  env: prod\n",
        )
        .expect("write");

        let template = temp.path().join("facts-%%NODE%%.yaml");
        let source = TemplateRecordSource::new(template.to_string_lossy());
        let record = source.load("web1").expect("load");

        assert_eq!(record.name(), "web1");
        assert_eq!(
            record.facts().and_then(|f| f.get("env")),
            Some(&Value::from("prod"))
        );
        assert!(matches!(
            source.load("web2"),
            Err(FactdexError::RecordNotFound(_))
        ));
    }

    #[test]
    fn index_file_roundtrip() {
        let temp = tempdir().expect("temp dir");
        let mut source = FileIndexSource::with_base(temp.path());

        assert!(matches!(
            FactIndex::load(&source, "index.yaml"),
            Err(FactdexError::IndexSourceNotFound(_))
        ));

        let mut index = FactIndex::new();
        index.set_nodes(vec!["n1".to_string()]);
        index.save(&mut source, "sub/index.yaml").expect("save");

        let loaded = FactIndex::load(&source, "sub/index.yaml").expect("load");
        assert_eq!(loaded, index);
    }
}
