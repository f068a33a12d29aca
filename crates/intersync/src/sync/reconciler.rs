//! One import run: load, observe, resolve, plan, execute, report.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, info, warn};

use super::cancel::CancelToken;
use super::error::SyncError;
use super::executor::{ExecutionContext, ExecutionOptions, Executor};
use super::plan::{Plan, TypeFilter};
use super::report::RunReport;
use super::resolver::{AssumeRemote, ObservedLookup, ResolutionTable};
use crate::error::Result;
use crate::model::{Identity, ManagedObject};
use crate::remote::{ObservedObject, RemoteApi};
use crate::schema::{ObjectSchema, SchemaRegistry};
use crate::store::{
    normalize_observed, DesiredSource, InvalidEntry, Loaded, ObjectStore, ObservedSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub safe_mode: bool,
    pub dry_run: bool,
    pub workers: usize,
    /// Canonical names, folders or short keys; empty means every type.
    pub object_types: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            safe_mode: false,
            dry_run: false,
            workers: num_cpus::get(),
            object_types: Vec::new(),
        }
    }
}

impl SyncOptions {
    fn execution(&self) -> ExecutionOptions {
        ExecutionOptions {
            safe_mode: self.safe_mode,
            dry_run: self.dry_run,
            workers: self.workers,
        }
    }
}

pub struct Reconciler<'a> {
    registry: &'a SchemaRegistry,
    remote: &'a dyn RemoteApi,
    options: SyncOptions,
    cancel: CancelToken,
}

/// Desired objects keyed by identity, plus the identities defined twice
/// and the entries that name an object but could not be read.
struct DesiredSet {
    store: ObjectStore,
    duplicates: HashMap<Identity, SyncError>,
    invalid: Vec<InvalidEntry>,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a SchemaRegistry, remote: &'a dyn RemoteApi, options: SyncOptions) -> Self {
        Self {
            registry,
            remote,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Brings the remote side in line with `source`.
    ///
    /// Errors are returned only for failures that make the whole run
    /// meaningless: an unknown type filter, an unreadable files directory
    /// or a managed type that cannot be listed. Everything else ends up in
    /// the report.
    pub fn run(&self, source: &dyn DesiredSource) -> Result<RunReport> {
        let _span = tracing::info_span!("sync.import", dry_run = self.options.dry_run).entered();
        let filter = TypeFilter::parse(self.registry, &self.options.object_types)?;
        let mut report = RunReport::new(self.options.dry_run, self.options.safe_mode);

        let loaded = source.list_desired(self.registry)?;
        let desired = take_loaded(&mut report, loaded, &filter);
        info!("Loaded {} desired objects", desired.store.len());

        let (observed, warnings) = observe(self.registry, self.remote, self.registry.schemas(), |s| {
            s.is_managed() && filter.includes(&s.object_type)
        })?;
        report.warnings = warnings;
        report.rejected = observed.rejected.clone();
        info!(
            "Observed {} remote objects ({} system defaults)",
            observed.store.len(),
            observed.system_defaults.len()
        );

        let plan = self.execute_into(&mut report, &desired, &observed, &observed.store, &filter);
        debug!("Executed {} operations", plan.len());
        Ok(report)
    }

    /// Checks a file tree without contacting the backend: schema
    /// validation, duplicate identities, references within the tree and
    /// cycles. References leaving the tree are assumed to exist remotely.
    ///
    /// Runs as a dry run, so the remote is never called.
    pub fn validate(&self, source: &dyn DesiredSource) -> Result<RunReport> {
        let _span = tracing::info_span!("sync.validate").entered();
        let filter = TypeFilter::parse(self.registry, &self.options.object_types)?;
        let mut report = RunReport::new(true, self.options.safe_mode);
        let loaded = source.list_desired(self.registry)?;
        let desired = take_loaded(&mut report, loaded, &filter);

        let validator = Reconciler {
            registry: self.registry,
            remote: self.remote,
            options: SyncOptions {
                dry_run: true,
                ..self.options.clone()
            },
            cancel: self.cancel.clone(),
        };
        validator.execute_into(
            &mut report,
            &desired,
            &ObservedSnapshot::default(),
            &AssumeRemote,
            &filter,
        );
        Ok(report)
    }

    fn execute_into(
        &self,
        report: &mut RunReport,
        desired: &DesiredSet,
        observed: &ObservedSnapshot,
        lookup: &dyn ObservedLookup,
        filter: &TypeFilter,
    ) -> Plan {
        let unreadable = hold_invalid(&desired.invalid, &observed.store);
        let held: HashSet<Identity> = unreadable.keys().cloned().collect();
        let mut prefailed = desired.duplicates.clone();
        for (identity, error) in unreadable {
            prefailed.entry(identity).or_insert(error);
        }

        let resolution = ResolutionTable::resolve_holding(&desired.store, lookup, &held);
        for (identity, errors) in resolution.failed() {
            for error in errors {
                warn!("{}: {}", identity, error);
            }
        }

        let plan = Plan::compute_holding(self.registry, &desired.store, observed, filter, &held);
        report.plan = plan.classification();
        info!(
            "Plan: {} to create, {} to update, {} to delete, {} unchanged",
            report.plan.create, report.plan.update, report.plan.delete, report.plan.noop
        );

        let ctx = ExecutionContext {
            resolution: &resolution,
            prefailed: &prefailed,
            observed: &observed.store,
        };
        let execution = Executor::new(
            self.registry,
            self.remote,
            self.options.execution(),
            self.cancel.clone(),
        )
        .execute(&plan, &ctx);

        report.outcomes = execution.outcomes;
        report.interrupted = self.cancel.is_interrupted();
        report.timed_out = execution.cancelled && !report.interrupted;
        report.finished_at = Utc::now();
        plan
    }
}

/// Moves file errors into the report and keeps the included objects.
fn take_loaded(report: &mut RunReport, loaded: Loaded, filter: &TypeFilter) -> DesiredSet {
    report.file_errors = loaded.errors;
    let mut desired = collect_desired(loaded.objects, filter);
    desired.invalid = loaded
        .invalid
        .into_iter()
        .filter(|entry| filter.includes(&entry.object_type))
        .collect();
    desired
}

/// Keeps the objects of included types. The first definition of an
/// identity stays in the set and is failed as a duplicate.
fn collect_desired(objects: Vec<ManagedObject>, filter: &TypeFilter) -> DesiredSet {
    let mut store = ObjectStore::new();
    let mut origins: HashMap<Identity, Vec<PathBuf>> = HashMap::new();

    for object in objects {
        if !filter.includes(object.object_type()) {
            continue;
        }
        let origin = object.origin().map(PathBuf::from).unwrap_or_default();
        match store.insert(object) {
            Ok(()) => {}
            Err(duplicate) => {
                let identity = duplicate.identity().clone();
                warn!("{} is defined more than once", identity);
                origins
                    .entry(identity.clone())
                    .or_insert_with(|| {
                        store
                            .get(&identity)
                            .and_then(ManagedObject::origin)
                            .map(PathBuf::from)
                            .into_iter()
                            .collect()
                    })
                    .push(origin);
            }
        }
    }

    let duplicates = origins
        .into_iter()
        .map(|(identity, origins)| {
            let error = SyncError::DuplicateIdentity {
                identity: identity.clone(),
                origins,
            };
            (identity, error)
        })
        .collect();
    DesiredSet {
        store,
        duplicates,
        invalid: Vec::new(),
    }
}

/// Failures for the objects named by unreadable entries. An entry whose
/// organization could not be read holds every observed object with its
/// type and name.
fn hold_invalid(invalid: &[InvalidEntry], observed: &ObjectStore) -> HashMap<Identity, SyncError> {
    let mut held = HashMap::new();
    for entry in invalid {
        let identities: Vec<Identity> = match &entry.identity {
            Some(identity) => vec![identity.clone()],
            None => observed
                .identities()
                .filter(|identity| entry.matches(identity))
                .cloned()
                .collect(),
        };
        for identity in identities {
            warn!("Holding {} back: {}", identity, entry.message);
            held.entry(identity.clone())
                .or_insert_with(|| SyncError::InvalidDefinition {
                    identity,
                    path: entry.path.clone(),
                    message: entry.message.clone(),
                });
        }
    }
    held
}

/// Lists the given types and normalizes the result.
///
/// A listing failure is fatal for types where `required` holds and a
/// warning otherwise.
pub(crate) fn observe<'s>(
    registry: &SchemaRegistry,
    remote: &dyn RemoteApi,
    schemas: impl Iterator<Item = &'s ObjectSchema>,
    required: impl Fn(&ObjectSchema) -> bool,
) -> Result<(ObservedSnapshot, Vec<String>)> {
    let mut listings: Vec<(String, Vec<ObservedObject>)> = Vec::new();
    let mut warnings = Vec::new();

    for schema in schemas {
        match remote.list_objects(&schema.object_type) {
            Ok(objects) => {
                debug!("Listed {} {} objects", objects.len(), schema.object_type);
                listings.push((schema.object_type.clone(), objects));
            }
            Err(e) if !required(schema) => {
                warn!("Could not list {}: {}", schema.object_type, e);
                warnings.push(format!("could not list {}: {}", schema.object_type, e));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok((normalize_observed(registry, listings), warnings))
}
