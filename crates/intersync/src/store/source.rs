//! Desired state read from a directory tree of YAML files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::error::{Result, SourceError};
use crate::model::{reference_name, Fields, Identity, ManagedObject, DEFAULT_ORGANIZATION};
use crate::schema::{ObjectSchema, SchemaRegistry};

/// A file, or one entry of a file, that could not become an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// An entry whose type and name are known but which is otherwise broken.
///
/// The object it meant to define must not be mistaken for one that was
/// removed from the files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    pub path: PathBuf,
    pub object_type: String,
    pub name: String,
    /// `None` when the entry's organization could not be read.
    pub identity: Option<Identity>,
    pub message: String,
}

impl InvalidEntry {
    /// Whether `identity` may be the object this entry defines.
    pub fn matches(&self, identity: &Identity) -> bool {
        match &self.identity {
            Some(own) => own == identity,
            None => identity.object_type == self.object_type && identity.name == self.name,
        }
    }
}

/// Result of listing desired objects.
#[derive(Debug, Default)]
pub struct Loaded {
    pub objects: Vec<ManagedObject>,
    pub errors: Vec<FileError>,
    /// Broken entries that still name an object; each also has a
    /// [`FileError`].
    pub invalid: Vec<InvalidEntry>,
}

enum EntryError {
    Unidentified(String),
    Invalid(InvalidEntry),
}

/// Supplier of desired state.
pub trait DesiredSource: Send + Sync {
    fn list_desired(&self, registry: &SchemaRegistry) -> Result<Loaded>;
}

/// Reads every `.yaml` / `.yml` file below a root directory.
///
/// A file holds one mapping or a list of mappings. Parse failures and
/// invalid entries are collected per file and never stop the walk.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn yaml_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| {
                let hidden = path
                    .strip_prefix(&self.root)
                    .map(|relative| {
                        relative.components().any(|c| {
                            c.as_os_str()
                                .to_str()
                                .map(|s| s.starts_with('.'))
                                .unwrap_or(false)
                        })
                    })
                    .unwrap_or(false);
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                !hidden && (ext == "yaml" || ext == "yml")
            })
            .collect()
    }

    /// Parses one file into raw entries.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Fields>> {
        let content = fs::read_to_string(path).map_err(|e| SourceError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        parse_entries(&content, path)
    }
}

impl DesiredSource for FileSource {
    fn list_desired(&self, registry: &SchemaRegistry) -> Result<Loaded> {
        if !self.root.is_dir() {
            return Err(SourceError::DirNotFound(self.root.clone()));
        }

        let mut loaded = Loaded::default();
        for path in self.yaml_files() {
            let entries = match self.load_file(&path) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                    loaded.errors.push(FileError {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for (index, entry) in entries.into_iter().enumerate() {
                let message = match build_object(registry, entry, &path) {
                    Ok(object) => {
                        loaded.objects.push(object);
                        continue;
                    }
                    Err(EntryError::Unidentified(message)) => message,
                    Err(EntryError::Invalid(invalid)) => {
                        let message = invalid.message.clone();
                        loaded.invalid.push(invalid);
                        message
                    }
                };
                log::warn!("Skipping entry {} of {}: {}", index + 1, path.display(), message);
                loaded.errors.push(FileError {
                    path: path.clone(),
                    message,
                });
            }
        }

        log::info!(
            "Loaded {} objects from {} ({} file errors)",
            loaded.objects.len(),
            self.root.display(),
            loaded.errors.len()
        );
        Ok(loaded)
    }
}

fn parse_entries(content: &str, path: &Path) -> Result<Vec<Fields>> {
    let parse_error = |message: String| SourceError::ParseYaml {
        path: path.to_path_buf(),
        message,
    };
    let document: Value =
        serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?;

    match document {
        Value::Null => Ok(Vec::new()),
        Value::Object(fields) => Ok(vec![fields]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(fields) => Ok(fields),
                _ => Err(parse_error(format!("list entry {} is not a mapping", i + 1))),
            })
            .collect(),
        _ => Err(parse_error("expected a mapping or a list of mappings".to_string())),
    }
}

/// Expands a simplified `ObjectType` and builds the desired object.
fn build_object(
    registry: &SchemaRegistry,
    mut fields: Fields,
    path: &Path,
) -> std::result::Result<ManagedObject, EntryError> {
    let raw_type = fields
        .get("ObjectType")
        .and_then(Value::as_str)
        .ok_or_else(|| EntryError::Unidentified("missing ObjectType".to_string()))?;
    let object_type = registry
        .resolve_type_name(raw_type)
        .ok_or_else(|| EntryError::Unidentified(format!("unknown object type '{}'", raw_type)))?
        .to_string();

    let schema = registry
        .lookup(&object_type)
        .map_err(|e| EntryError::Unidentified(e.to_string()))?;
    if !schema.is_managed() {
        return Err(EntryError::Unidentified(format!(
            "{} objects cannot be managed from files",
            object_type
        )));
    }

    fields.insert("ObjectType".to_string(), Value::String(object_type.clone()));
    let named = entry_identity(schema, &fields);
    ManagedObject::desired(registry, fields, Some(path.to_path_buf())).map_err(|e| match named {
        Some((name, identity)) => EntryError::Invalid(InvalidEntry {
            path: path.to_path_buf(),
            object_type,
            name,
            identity,
            message: e.to_string(),
        }),
        None => EntryError::Unidentified(e.to_string()),
    })
}

/// Name and, when readable, identity of a raw entry.
fn entry_identity(schema: &ObjectSchema, fields: &Fields) -> Option<(String, Option<Identity>)> {
    let name = fields
        .get("Name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())?
        .to_string();
    let identity = if schema.is_global() {
        Some(Identity::global(&schema.object_type, &name))
    } else {
        match fields.get("Organization") {
            None | Some(Value::Null) => Some(DEFAULT_ORGANIZATION.to_string()),
            Some(value) => reference_name(value),
        }
        .map(|org| Identity::scoped(&schema.object_type, org, &name))
    };
    Some((name, identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn load(dir: &TempDir) -> Loaded {
        FileSource::new(dir.path())
            .list_desired(&SchemaRegistry::builtin())
            .unwrap()
    }

    #[test]
    fn test_loads_single_and_multi_document_files() {
        let dir = TempDir::new().unwrap();
        dir.child("organizations/default.yaml")
            .write_str("ObjectType: organization.Organization\nName: default\n")
            .unwrap();
        dir.child("policies/ntp/all.yml")
            .write_str(
                "- ObjectType: policies/ntp\n  Name: ntp-a\n- ObjectType: ntp\n  Name: ntp-b\n",
            )
            .unwrap();

        let loaded = load(&dir);
        assert!(loaded.errors.is_empty(), "{:?}", loaded.errors);
        let names: Vec<String> = loaded.objects.iter().map(|o| o.identity().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "organization.Organization default",
                "ntp.Policy default/ntp-a",
                "ntp.Policy default/ntp-b",
            ]
        );
        assert_eq!(loaded.objects[1].fields()["ObjectType"], "ntp.Policy");
    }

    #[test]
    fn test_skips_hidden_and_non_yaml_files() {
        let dir = TempDir::new().unwrap();
        dir.child(".git/config.yaml")
            .write_str("ObjectType: ntp.Policy\nName: hidden\n")
            .unwrap();
        dir.child("policies/.draft.yaml")
            .write_str("ObjectType: ntp.Policy\nName: draft\n")
            .unwrap();
        dir.child("README.md").write_str("# files").unwrap();

        let loaded = load(&dir);
        assert!(loaded.objects.is_empty());
        assert!(loaded.errors.is_empty());
    }

    #[test]
    fn test_parse_failures_are_collected_per_file() {
        let dir = TempDir::new().unwrap();
        dir.child("a.yaml").write_str("Name: [unclosed").unwrap();
        dir.child("b.yaml")
            .write_str("ObjectType: nosuch.Type\nName: x\n")
            .unwrap();
        dir.child("c.yaml")
            .write_str("ObjectType: compute.Blade\nName: blade-1\n")
            .unwrap();
        dir.child("d.yaml")
            .write_str("ObjectType: ntp.Policy\nName: ok\n")
            .unwrap();

        let loaded = load(&dir);
        assert_eq!(loaded.objects.len(), 1);
        assert_eq!(loaded.errors.len(), 3);
        assert!(loaded.errors[1].message.contains("unknown object type"));
        assert!(loaded.errors[2].message.contains("cannot be managed"));
    }

    #[test]
    fn test_broken_entries_keep_their_identity() {
        let dir = TempDir::new().unwrap();
        dir.child("a.yaml")
            .write_str("ObjectType: ntp.Policy\nName: keep\nOrganization: [default]\n")
            .unwrap();
        dir.child("b.yaml")
            .write_str("ObjectType: server.Profile\nName: sp1\nOrganization: prod\nBiosPolicy: [a, b]\n")
            .unwrap();
        dir.child("c.yaml")
            .write_str("ObjectType: ntp.Policy\nOrganization: prod\n")
            .unwrap();

        let loaded = load(&dir);
        assert!(loaded.objects.is_empty());
        assert_eq!(loaded.errors.len(), 3);
        assert_eq!(loaded.invalid.len(), 2);

        let keep = &loaded.invalid[0];
        assert_eq!(keep.identity, None);
        assert!(keep.matches(&Identity::scoped("ntp.Policy", "default", "keep")));
        assert!(keep.matches(&Identity::scoped("ntp.Policy", "prod", "keep")));
        assert!(!keep.matches(&Identity::scoped("ntp.Policy", "default", "other")));

        let sp1 = Identity::scoped("server.Profile", "prod", "sp1");
        assert_eq!(loaded.invalid[1].identity, Some(sp1.clone()));
        assert!(loaded.invalid[1].matches(&sp1));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let source = FileSource::new("/nonexistent/intersync/files");
        assert!(matches!(
            source.list_desired(&SchemaRegistry::builtin()),
            Err(SourceError::DirNotFound(_))
        ));
    }
}
