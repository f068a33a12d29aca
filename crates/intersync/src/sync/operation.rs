//! Lifecycle of a single planned operation.
//!
//! ```text
//! Planned -> Validating -> Applying -> Succeeded | Failed
//!    |           |
//!    |           +-> Succeeded (no-op, dry run) | Failed | Skipped
//!    +-> Skipped | Failed
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::SyncError;
use super::plan::OperationKind;
use super::report::{Outcome, ReportSink};
use crate::model::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    SafeMode,
    Protected,
    Cancelled,
    DependencyFailed { dependency: Identity },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafeMode => f.write_str("safe mode"),
            Self::Protected => f.write_str("protected object"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency {} failed", dependency)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationState {
    Planned,
    Validating,
    Applying,
    Succeeded,
    Failed(SyncError),
    Skipped(SkipReason),
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Skipped(_))
    }

    pub fn can_advance_to(&self, next: &OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Planned, Validating | Failed(_) | Skipped(_))
                | (Validating, Applying | Succeeded | Failed(_) | Skipped(_))
                | (Applying, Succeeded | Failed(_))
        )
    }
}

/// Tracks one operation from `Planned` to its terminal state.
#[derive(Debug)]
pub struct OperationRun {
    identity: Identity,
    kind: OperationKind,
    state: OperationState,
    changed_fields: Vec<String>,
    started: Option<(u64, DateTime<Utc>)>,
}

impl OperationRun {
    pub fn new(identity: Identity, kind: OperationKind, changed_fields: Vec<String>) -> Self {
        Self {
            identity,
            kind,
            state: OperationState::Planned,
            changed_fields,
            started: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    /// Moves to `next`. Entering `Applying` stamps the start of the
    /// backend call.
    pub fn advance(&mut self, next: OperationState, sink: &ReportSink) {
        if !self.state.can_advance_to(&next) {
            log::error!(
                "{}: illegal transition {:?} -> {:?}",
                self.identity,
                self.state,
                next
            );
            debug_assert!(false, "illegal operation transition");
            return;
        }
        if next == OperationState::Applying {
            self.started = Some((sink.tick(), Utc::now()));
        }
        self.state = next;
    }

    /// Ends an operation that never started, e.g. one held up by a failed
    /// dependency.
    pub fn terminate(
        mut self,
        terminal: OperationState,
        sink: &ReportSink,
        dry_run: bool,
    ) -> OperationState {
        self.advance(terminal, sink);
        self.finish(sink, dry_run)
    }

    /// Records the terminal state. Returns the state for the caller's
    /// bookkeeping.
    pub fn finish(self, sink: &ReportSink, dry_run: bool) -> OperationState {
        debug_assert!(self.state.is_terminal());
        let outcome = Outcome::new(
            self.identity,
            self.kind,
            self.state.clone(),
            self.changed_fields,
            dry_run,
            self.started,
            (sink.tick(), Utc::now()),
        );
        sink.record(outcome);
        self.state
    }
}
