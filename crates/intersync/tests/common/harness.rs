//! Test harness for isolated runs.
//!
//! Every harness owns a temporary files directory and an in-memory backend,
//! so tests can run import, export and validate end to end and inspect the
//! call log afterwards.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use intersync::remote::CallKind;
use intersync::sync::{ExportReport, Outcome, Status};
use intersync::{
    CancelToken, ExportOptions, Exporter, FileSource, FileWriter, Identity, InMemoryRemote,
    Reconciler, RunReport, SchemaRegistry, SyncOptions,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub files_dir: PathBuf,
    pub registry: SchemaRegistry,
    pub remote: InMemoryRemote,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(SchemaRegistry::builtin(), InMemoryRemote::new())
    }

    pub fn with(registry: SchemaRegistry, remote: InMemoryRemote) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let files_dir = temp_dir.path().join("files");
        fs::create_dir_all(&files_dir).expect("Failed to create files directory");
        Self {
            temp_dir,
            files_dir,
            registry,
            remote,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file below the files directory.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.files_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.files_dir.join(relative)).expect("Failed to remove file");
    }

    pub fn import(&self, options: SyncOptions) -> RunReport {
        self.import_with(options, CancelToken::new())
    }

    pub fn import_with(&self, options: SyncOptions, cancel: CancelToken) -> RunReport {
        Reconciler::new(&self.registry, &self.remote, options)
            .with_cancel(cancel)
            .run(&FileSource::new(&self.files_dir))
            .expect("Import run failed")
    }

    pub fn validate(&self) -> RunReport {
        Reconciler::new(&self.registry, &self.remote, options())
            .validate(&FileSource::new(&self.files_dir))
            .expect("Validation run failed")
    }

    pub fn export(&self, options: ExportOptions) -> ExportReport {
        Exporter::new(
            &self.registry,
            &self.remote,
            FileWriter::new(&self.files_dir),
            options,
        )
        .run()
        .expect("Export run failed")
    }

    /// Names of stored remote objects of one type, in creation order.
    pub fn remote_names(&self, object_type: &str) -> Vec<String> {
        self.remote
            .objects(object_type)
            .iter()
            .filter_map(|f| f.get("Name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn mutating_calls(&self) -> usize {
        [CallKind::Create, CallKind::Update, CallKind::Delete]
            .into_iter()
            .map(|kind| self.remote.calls_of(kind).len())
            .sum()
    }
}

pub fn options() -> SyncOptions {
    SyncOptions {
        workers: 4,
        ..SyncOptions::default()
    }
}

pub fn outcome<'a>(report: &'a RunReport, identity: &Identity) -> &'a Outcome {
    report
        .outcome(identity)
        .unwrap_or_else(|| panic!("no outcome for {}", identity))
}

pub fn status(report: &RunReport, identity: &Identity) -> Status {
    outcome(report, identity).status
}
