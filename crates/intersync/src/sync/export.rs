//! Writes remote state into the file layout.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use super::plan::TypeFilter;
use super::reconciler::observe;
use crate::error::Result;
use crate::model::{Identity, ManagedObject};
use crate::remote::RemoteApi;
use crate::schema::{ObjectSchema, SchemaRegistry};
use crate::store::{FileWriter, RejectedObject, SourceError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub object_types: Vec<String>,
    /// Remove files of exported types that no longer match a remote object.
    pub prune: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub per_type: BTreeMap<String, usize>,
    pub system_defaults: usize,
    pub pruned: usize,
    pub rejected: Vec<RejectedObject>,
    pub warnings: Vec<String>,
}

pub struct Exporter<'a> {
    registry: &'a SchemaRegistry,
    remote: &'a dyn RemoteApi,
    writer: FileWriter,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        remote: &'a dyn RemoteApi,
        writer: FileWriter,
        options: ExportOptions,
    ) -> Self {
        Self {
            registry,
            remote,
            writer,
            options,
        }
    }

    pub fn run(&self) -> Result<ExportReport> {
        let _span = tracing::info_span!("sync.export").entered();
        let filter = TypeFilter::parse(self.registry, &self.options.object_types)?;
        let exported: Vec<&ObjectSchema> = self
            .registry
            .managed()
            .filter(|s| filter.includes(&s.object_type))
            .collect();
        let listed = self.with_dependencies(&exported);

        let (snapshot, warnings) = observe(
            self.registry,
            self.remote,
            listed.iter().copied(),
            |s| filter.includes(&s.object_type) && s.is_managed(),
        )?;
        let mut report = ExportReport {
            rejected: snapshot.rejected.clone(),
            warnings,
            ..ExportReport::default()
        };

        let exported_types: HashSet<&str> =
            exported.iter().map(|s| s.object_type.as_str()).collect();
        let mut planned: Vec<(&ManagedObject, &ObjectSchema, PathBuf)> = Vec::new();
        for object in snapshot.store.iter() {
            if !exported_types.contains(object.object_type()) {
                continue;
            }
            if snapshot.is_system_default(object.identity()) {
                report.system_defaults += 1;
                continue;
            }
            let schema = self.registry.lookup(object.object_type())?;
            let organization = object.identity().organization.as_deref();
            let path = FileWriter::relative_path(schema, object.name(), organization);
            planned.push((object, schema, path));
        }

        // Objects whose plain paths collide all get identity-derived names,
        // so the choice does not depend on listing order.
        let mut claims: HashMap<&Path, usize> = HashMap::new();
        for (_, _, path) in &planned {
            *claims.entry(path.as_path()).or_default() += 1;
        }
        let shared: HashSet<PathBuf> = claims
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path.to_path_buf())
            .collect();

        let mut owners: HashMap<PathBuf, &Identity> = HashMap::new();
        let mut kept: HashMap<&str, HashSet<PathBuf>> = HashMap::new();
        for (object, schema, path) in planned {
            let organization = object.identity().organization.as_deref();
            let relative = if shared.contains(&path) {
                warn!(
                    "{} shares the file name {} with another object",
                    object.identity(),
                    path.display()
                );
                FileWriter::disambiguated_path(schema, object.name(), organization)
            } else {
                path
            };
            if let Some(owner) = owners.insert(relative.clone(), object.identity()) {
                return Err(SourceError::PathConflict {
                    path: relative,
                    first: owner.to_string(),
                    second: object.identity().to_string(),
                }
                .into());
            }

            let written = self
                .writer
                .write(&relative, schema, &object.user_fields(schema))?;
            *report.per_type.entry(schema.object_type.clone()).or_default() += 1;
            kept.entry(schema.object_type.as_str())
                .or_default()
                .insert(written.clone());
            report.written.push(written);
        }

        if self.options.prune {
            for schema in &exported {
                let Some(folder) = schema.folder.as_deref() else { continue };
                let keep = kept.remove(schema.object_type.as_str()).unwrap_or_default();
                report.pruned += self.writer.prune(folder, &keep)?;
            }
        }

        info!(
            "Exported {} objects to {} ({} system defaults skipped)",
            report.written.len(),
            self.writer.root().display(),
            report.system_defaults
        );
        Ok(report)
    }

    /// `exported` plus every type they transitively depend on, so
    /// references can be named.
    fn with_dependencies(&self, exported: &[&'a ObjectSchema]) -> Vec<&'a ObjectSchema> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out: Vec<&'a ObjectSchema> = Vec::new();
        let mut stack: Vec<&'a ObjectSchema> = exported.iter().rev().copied().collect();
        while let Some(schema) = stack.pop() {
            if !seen.insert(schema.object_type.as_str()) {
                continue;
            }
            out.push(schema);
            for dep in schema.dependency_types() {
                if let Ok(dep_schema) = self.registry.lookup(dep) {
                    stack.push(dep_schema);
                }
            }
        }
        out
    }
}
