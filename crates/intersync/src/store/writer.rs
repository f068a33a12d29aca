//! Writes objects back into the folder-per-type file layout.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use super::error::{Result, SourceError};
use crate::model::{canonical_value, Fields, DEFAULT_ORGANIZATION};
use crate::sanitize::sanitize_file_name;
use crate::schema::ObjectSchema;

pub struct FileWriter {
    root: PathBuf,
}

impl FileWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path, relative to the root, an object is exported to.
    pub fn relative_path(schema: &ObjectSchema, name: &str, organization: Option<&str>) -> PathBuf {
        Self::folder(schema).join(format!("{}.yaml", Self::stem(name, organization)))
    }

    /// Like [`FileWriter::relative_path`], with a suffix derived from the
    /// identity. Used when several objects map to the same plain path.
    pub fn disambiguated_path(
        schema: &ObjectSchema,
        name: &str,
        organization: Option<&str>,
    ) -> PathBuf {
        let key = format!("{}\0{}", organization.unwrap_or(""), name);
        let digest = blake3::hash(key.as_bytes()).to_hex();
        Self::folder(schema).join(format!(
            "{}-{}.yaml",
            Self::stem(name, organization),
            &digest.as_str()[..8]
        ))
    }

    fn folder(schema: &ObjectSchema) -> PathBuf {
        PathBuf::from(
            schema
                .folder
                .clone()
                .unwrap_or_else(|| schema.object_type.replace('.', "/")),
        )
    }

    fn stem(name: &str, organization: Option<&str>) -> String {
        match organization.filter(|o| *o != DEFAULT_ORGANIZATION) {
            Some(org) => format!("{}_{}", sanitize_file_name(org), sanitize_file_name(name)),
            None => sanitize_file_name(name),
        }
    }

    /// Writes one object at `relative` and returns the full path written.
    pub fn write(&self, relative: &Path, schema: &ObjectSchema, fields: &Fields) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SourceError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let ordered = export_fields(schema, fields);
        let content = serde_yaml::to_string(&Value::Object(ordered))?;
        fs::write(&path, content).map_err(|e| SourceError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Removes YAML files under `folder` that are not in `keep`.
    pub fn prune(&self, folder: &str, keep: &HashSet<PathBuf>) -> Result<usize> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !entry.file_type().is_file() || (ext != "yaml" && ext != "yml") {
                continue;
            }
            if keep.contains(path) {
                continue;
            }
            fs::remove_file(path).map_err(|e| SourceError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            log::info!("Removed stale file {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}

/// User fields ordered for export: `ObjectType`, `Name`, declared fields
/// in schema order, then the rest alphabetically. System, read-only and
/// empty values are left out.
pub fn export_fields(schema: &ObjectSchema, fields: &Fields) -> Fields {
    let mut out = Map::new();
    let push = |key: &str, out: &mut Fields| {
        if schema.is_read_only(key) || out.contains_key(key) {
            return;
        }
        if let Some(value) = fields.get(key).and_then(canonical_value) {
            out.insert(key.to_string(), value);
        }
    };

    push("ObjectType", &mut out);
    push("Name", &mut out);
    for def in schema.validators() {
        push(&def.name, &mut out);
    }
    let mut rest: Vec<&String> = fields.keys().collect();
    rest.sort();
    for key in rest {
        push(key, &mut out);
    }
    out
}
