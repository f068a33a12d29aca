//! Applies a plan against the remote API.
//!
//! Creates and updates run first, level by level in dependency order.
//! Deletions follow as a second phase with dependents removed before the
//! objects they reference. Within a level, operations run concurrently on
//! a bounded pool; a level only starts once the previous one has fully
//! reported.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use log::{debug, error, info, warn};
use serde_json::{json, Value};

use super::cancel::CancelToken;
use super::error::{Result, SyncError};
use super::graph::{DependencyGraph, EdgeKind};
use super::operation::{OperationRun, OperationState, SkipReason};
use super::plan::{Operation, OperationKind, Plan};
use super::pool::LevelPool;
use super::report::{Outcome, ReportSink};
use super::resolver::{Binding, ResolutionTable, ResolvedRef};
use crate::model::{Fields, Identity, ManagedObject, RemoteHandle, DEFAULT_ORGANIZATION};
use crate::remote::RemoteApi;
use crate::schema::{FieldKind, SchemaRegistry, ORGANIZATION_TYPE};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub safe_mode: bool,
    pub dry_run: bool,
    pub workers: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            safe_mode: false,
            dry_run: false,
            workers: num_cpus::get(),
        }
    }
}

/// Everything the executor needs besides the plan.
pub struct ExecutionContext<'a> {
    pub resolution: &'a ResolutionTable,
    /// Objects already known to fail, e.g. duplicates or unresolved
    /// references. They are reported without touching the backend.
    pub prefailed: &'a HashMap<Identity, SyncError>,
    pub observed: &'a ObjectStore,
}

#[derive(Debug)]
pub struct Execution {
    pub outcomes: Vec<Outcome>,
    pub cancelled: bool,
}

/// Handles of objects that exist remotely, filled in as creates succeed.
struct HandleTable(RwLock<HashMap<Identity, RemoteHandle>>);

impl HandleTable {
    fn seeded(observed: &ObjectStore) -> Self {
        let handles = observed
            .iter()
            .filter_map(|o| o.handle().map(|h| (o.identity().clone(), h.clone())))
            .collect();
        Self(RwLock::new(handles))
    }

    fn get(&self, identity: &Identity) -> Option<RemoteHandle> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity)
            .cloned()
    }

    fn insert(&self, identity: Identity, handle: RemoteHandle) {
        self.0
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity, handle);
    }
}

pub struct Executor<'a> {
    registry: &'a SchemaRegistry,
    remote: &'a dyn RemoteApi,
    options: ExecutionOptions,
    cancel: CancelToken,
}

struct PhaseState<'a> {
    ctx: &'a ExecutionContext<'a>,
    sink: &'a ReportSink,
    handles: &'a HandleTable,
    /// Objects that failed or were skipped because something they need
    /// failed.
    failed: HashSet<Identity>,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        remote: &'a dyn RemoteApi,
        options: ExecutionOptions,
        cancel: CancelToken,
    ) -> Self {
        Self {
            registry,
            remote,
            options,
            cancel,
        }
    }

    pub fn execute(&self, plan: &Plan, ctx: &ExecutionContext<'_>) -> Execution {
        let sink = ReportSink::new();
        let handles = HandleTable::seeded(ctx.observed);
        let pool = LevelPool::new(self.options.workers.max(1));
        let mut state = PhaseState {
            ctx,
            sink: &sink,
            handles: &handles,
            failed: HashSet::new(),
        };

        let (deletes, applies): (Vec<&Operation>, Vec<&Operation>) = plan
            .operations()
            .iter()
            .partition(|op| op.kind == OperationKind::Delete);

        info!(
            "Executing {} operations ({} deletions) with {} workers{}{}",
            plan.len(),
            deletes.len(),
            pool.worker_count(),
            if self.options.dry_run { ", dry run" } else { "" },
            if self.options.safe_mode { ", safe mode" } else { "" },
        );

        let apply_graph = self.apply_graph(&applies, ctx.resolution);
        self.run_phase(&pool, &applies, &apply_graph, &mut state);

        let delete_graph = self.delete_graph(&deletes);
        self.run_phase(&pool, &deletes, &delete_graph, &mut state);

        Execution {
            outcomes: sink.into_outcomes(),
            cancelled: self.cancel.is_cancelled(),
        }
    }

    /// Reference edges to pending targets plus type-order edges.
    fn apply_graph(&self, ops: &[&Operation], resolution: &ResolutionTable) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for op in ops {
            graph.add_node(op.identity.clone());
        }
        for op in ops {
            for dependency in resolution.pending_dependencies(&op.identity) {
                graph.add_edge(&op.identity, dependency, EdgeKind::Hard);
            }
        }
        self.add_type_edges(&mut graph, ops, false);
        graph
    }

    /// Deletion runs against reference direction: an object goes before
    /// the objects it references.
    fn delete_graph(&self, ops: &[&Operation]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for op in ops {
            graph.add_node(op.identity.clone());
        }
        for op in ops {
            let Some(observed) = &op.observed else { continue };
            for reference in observed.references() {
                graph.add_edge(&reference.target, &op.identity, EdgeKind::Hard);
            }
        }
        self.add_type_edges(&mut graph, ops, true);
        graph
    }

    fn add_type_edges(&self, graph: &mut DependencyGraph, ops: &[&Operation], reverse: bool) {
        let mut by_type: HashMap<&str, Vec<&Identity>> = HashMap::new();
        for op in ops {
            by_type
                .entry(op.identity.object_type.as_str())
                .or_default()
                .push(&op.identity);
        }
        for op in ops {
            let Ok(schema) = self.registry.lookup(&op.identity.object_type) else {
                continue;
            };
            for dep_type in schema.dependency_types() {
                for target in by_type.get(dep_type).into_iter().flatten() {
                    if reverse {
                        graph.add_edge(target, &op.identity, EdgeKind::Soft);
                    } else {
                        graph.add_edge(&op.identity, target, EdgeKind::Soft);
                    }
                }
            }
        }
    }

    fn run_phase(
        &self,
        pool: &LevelPool,
        ops: &[&Operation],
        graph: &DependencyGraph,
        state: &mut PhaseState<'_>,
    ) {
        if ops.is_empty() {
            return;
        }
        let by_id: HashMap<&Identity, &Operation> =
            ops.iter().map(|op| (&op.identity, *op)).collect();
        let schedule = graph.schedule();

        if !schedule.is_acyclic() {
            let affected = schedule.affected();
            error!(
                "Dependency cycle between: {}",
                affected
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            for member in &schedule.cycle_members {
                let error = SyncError::DependencyCycle {
                    identities: affected.clone(),
                };
                self.conclude(by_id[member], OperationState::Failed(error), state);
            }
            for blocked in &schedule.blocked {
                let reason = self.failed_dependency(graph, blocked, state);
                self.conclude(by_id[blocked], reason, state);
            }
        }

        for (depth, level) in schedule.levels.iter().enumerate() {
            let mut runnable = Vec::with_capacity(level.len());
            for identity in level {
                let op = by_id[identity];
                if self.cancel.is_cancelled() {
                    self.conclude(op, OperationState::Skipped(SkipReason::Cancelled), state);
                } else if graph
                    .dependencies_of(identity, EdgeKind::Hard)
                    .iter()
                    .any(|d| state.failed.contains(*d))
                {
                    let reason = self.failed_dependency(graph, identity, state);
                    self.conclude(op, reason, state);
                } else {
                    runnable.push(op);
                }
            }
            if runnable.is_empty() {
                continue;
            }
            debug!("Level {}: {} operations", depth, runnable.len());

            let shared = &*state;
            let results = pool.run(runnable.clone(), |_, op| self.process(op, shared));
            for (op, result) in runnable.into_iter().zip(results) {
                match result {
                    Some(OperationState::Failed(_))
                    | Some(OperationState::Skipped(SkipReason::DependencyFailed { .. })) => {
                        state.failed.insert(op.identity.clone());
                    }
                    Some(_) => {}
                    None => {
                        error!("Lost the worker running {} {}", op.kind, op.identity);
                        if !state.sink.is_recorded(&op.identity) {
                            OperationRun::new(op.identity.clone(), op.kind, Vec::new()).terminate(
                                OperationState::Failed(SyncError::WorkerLost),
                                state.sink,
                                self.options.dry_run,
                            );
                        }
                        state.failed.insert(op.identity.clone());
                    }
                }
            }
        }
    }

    fn failed_dependency(
        &self,
        graph: &DependencyGraph,
        identity: &Identity,
        state: &PhaseState<'_>,
    ) -> OperationState {
        let hard = graph.dependencies_of(identity, EdgeKind::Hard);
        let dependency = hard
            .iter()
            .find(|d| state.failed.contains(**d))
            .or_else(|| hard.first())
            .map(|d| (*d).clone())
            .unwrap_or_else(|| identity.clone());
        OperationState::Skipped(SkipReason::DependencyFailed { dependency })
    }

    /// Records a terminal state decided without running the operation.
    fn conclude(&self, op: &Operation, terminal: OperationState, state: &mut PhaseState<'_>) {
        if matches!(
            terminal,
            OperationState::Failed(_) | OperationState::Skipped(SkipReason::DependencyFailed { .. })
        ) {
            state.failed.insert(op.identity.clone());
        }
        if let OperationState::Skipped(reason) = &terminal {
            debug!("Skipping {} {}: {}", op.kind, op.identity, reason);
        }
        OperationRun::new(op.identity.clone(), op.kind, op.changed_fields.clone()).terminate(
            terminal,
            state.sink,
            self.options.dry_run,
        );
    }

    /// Runs one operation through its lifecycle on a worker.
    fn process(&self, op: &Operation, state: &PhaseState<'_>) -> OperationState {
        let _span =
            tracing::info_span!("sync.operation", kind = %op.kind, identity = %op.identity).entered();
        let mut run = OperationRun::new(op.identity.clone(), op.kind, op.changed_fields.clone());
        if self.cancel.is_cancelled() {
            run.advance(OperationState::Skipped(SkipReason::Cancelled), state.sink);
            return run.finish(state.sink, self.options.dry_run);
        }

        run.advance(OperationState::Validating, state.sink);
        if let Some(terminal) = self.validate(op, state) {
            if let OperationState::Failed(e) = &terminal {
                warn!("{} {} failed validation: {}", op.kind, op.identity, e);
            }
            run.advance(terminal, state.sink);
            return run.finish(state.sink, self.options.dry_run);
        }

        run.advance(OperationState::Applying, state.sink);
        let terminal = match self.apply(op, state) {
            Ok(()) => OperationState::Succeeded,
            Err(e) => {
                warn!("Failed to {} {}: {}", op.kind, op.identity, e);
                OperationState::Failed(e)
            }
        };
        run.advance(terminal, state.sink);
        run.finish(state.sink, self.options.dry_run)
    }

    /// Decides whether the operation ends before reaching the backend.
    fn validate(&self, op: &Operation, state: &PhaseState<'_>) -> Option<OperationState> {
        if let Some(error) = state.ctx.prefailed.get(&op.identity) {
            return Some(OperationState::Failed(error.clone()));
        }
        if let Some(error) = state.ctx.resolution.failures(&op.identity).first() {
            return Some(OperationState::Failed(error.clone()));
        }
        if let Some(desired) = &op.desired {
            if let Err(e) = self.registry.validate(desired) {
                return Some(OperationState::Failed(e.into()));
            }
        }
        if op.kind == OperationKind::Delete {
            if self.options.safe_mode {
                return Some(OperationState::Skipped(SkipReason::SafeMode));
            }
            if is_protected(&op.identity) {
                return Some(OperationState::Skipped(SkipReason::Protected));
            }
        }
        if op.kind == OperationKind::NoOp || self.options.dry_run {
            return Some(OperationState::Succeeded);
        }
        None
    }

    fn apply(&self, op: &Operation, state: &PhaseState<'_>) -> Result<()> {
        let object_type = op.identity.object_type.as_str();
        match (op.kind, &op.desired, &op.observed) {
            (OperationKind::Create, Some(desired), _) => {
                let payload = self.payload(desired, state)?;
                let handle = self.remote.create_object(object_type, &payload)?;
                info!("Created {} ({})", op.identity, handle);
                state.handles.insert(op.identity.clone(), handle);
            }
            (OperationKind::Update, Some(desired), Some(current)) => {
                let handle = current
                    .handle()
                    .ok_or_else(|| SyncError::MissingHandle(op.identity.clone()))?;
                let payload = self.payload(desired, state)?;
                self.remote.update_object(object_type, handle, &payload)?;
                info!("Updated {} [{}]", op.identity, op.changed_fields.join(", "));
            }
            (OperationKind::Delete, _, Some(current)) => {
                let handle = current
                    .handle()
                    .ok_or_else(|| SyncError::MissingHandle(op.identity.clone()))?;
                self.remote.delete_object(object_type, handle)?;
                info!("Deleted {} ({})", op.identity, handle);
            }
            _ => {}
        }
        Ok(())
    }

    /// Request body: user fields with references rewritten to
    /// `{ObjectType, Moid}`.
    fn payload(&self, desired: &ManagedObject, state: &PhaseState<'_>) -> Result<Fields> {
        let schema = self.registry.lookup(desired.object_type())?;
        let references = state.ctx.resolution.references(desired.identity());
        let mut payload = Fields::new();

        for (key, value) in desired.user_fields(schema) {
            let many = match schema.field(&key).map(|f| &f.kind) {
                Some(FieldKind::Reference { many, .. }) => *many,
                _ => {
                    payload.insert(key, value);
                    continue;
                }
            };
            let targets = references
                .iter()
                .filter(|r| r.field == key)
                .map(|r| reference_body(r, state.handles))
                .collect::<Result<Vec<Value>>>()?;
            if many {
                payload.insert(key, Value::Array(targets));
            } else if let Some(target) = targets.into_iter().next() {
                payload.insert(key, target);
            }
        }
        Ok(payload)
    }
}

fn reference_body(reference: &ResolvedRef, handles: &HandleTable) -> Result<Value> {
    let handle = match &reference.binding {
        Binding::Remote(handle) => handle.clone(),
        Binding::Pending(target) => handles
            .get(target)
            .ok_or_else(|| SyncError::MissingHandle(target.clone()))?,
    };
    Ok(json!({
        "ObjectType": reference.target.object_type,
        "Moid": handle.as_str(),
    }))
}

/// The default organization is never deleted.
fn is_protected(identity: &Identity) -> bool {
    identity.object_type == ORGANIZATION_TYPE && identity.name == DEFAULT_ORGANIZATION
}
