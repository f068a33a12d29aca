//! Reconciliation engine.
//!
//! A run loads desired state, observes remote state, binds references,
//! orders the objects by dependency, classifies each into an operation
//! and executes the plan level by level.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod export;
pub mod graph;
pub mod operation;
pub mod plan;
pub mod pool;
pub mod reconciler;
pub mod report;
pub mod resolver;

pub use cancel::CancelToken;
pub use error::SyncError;
pub use executor::{Execution, ExecutionContext, ExecutionOptions, Executor};
pub use export::{ExportOptions, ExportReport, Exporter};
pub use graph::{DependencyGraph, EdgeKind, Schedule};
pub use operation::{OperationRun, OperationState, SkipReason};
pub use plan::{Classification, Operation, OperationKind, Plan, TypeFilter};
pub use pool::LevelPool;
pub use reconciler::{Reconciler, SyncOptions};
pub use report::{Outcome, ReportSink, RunReport, Status, Summary, EXIT_INTERRUPTED};
pub use resolver::{AssumeRemote, Binding, ObservedLookup, ResolutionTable, ResolvedRef};
