//! Outcomes of a run and their rendering.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::error::SyncError;
use super::operation::{OperationState, SkipReason};
use super::plan::{Classification, OperationKind};
use crate::model::Identity;
use crate::store::{FileError, RejectedObject};

/// Exit status of an interrupted run, as shells report SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Succeeded,
    Failed,
    Skipped,
}

/// Terminal record of one object.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub identity: Identity,
    pub kind: OperationKind,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(serialize_with = "error_text", skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    pub dry_run: bool,
    /// Sequence number taken when the backend call started.
    pub started: Option<u64>,
    pub finished: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

fn error_text<S: Serializer>(error: &Option<SyncError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Outcome {
    pub(crate) fn new(
        identity: Identity,
        kind: OperationKind,
        state: OperationState,
        changed_fields: Vec<String>,
        dry_run: bool,
        started: Option<(u64, DateTime<Utc>)>,
        finished: (u64, DateTime<Utc>),
    ) -> Self {
        let (status, skip_reason, error) = match state {
            OperationState::Failed(e) => (Status::Failed, None, Some(e)),
            OperationState::Skipped(reason) => (Status::Skipped, Some(reason), None),
            _ => (Status::Succeeded, None, None),
        };
        Self {
            identity,
            kind,
            status,
            skip_reason,
            error,
            changed_fields,
            dry_run,
            started: started.map(|(seq, _)| seq),
            finished: finished.0,
            started_at: started.map(|(_, at)| at),
            finished_at: finished.1,
        }
    }

    fn detail(&self) -> String {
        match (&self.status, &self.skip_reason, &self.error) {
            (Status::Failed, _, Some(e)) => format!("failed: {}", e),
            (Status::Skipped, Some(reason), _) => format!("skipped ({})", reason),
            _ if self.dry_run && self.kind != OperationKind::NoOp => "would succeed".to_string(),
            _ => "succeeded".to_string(),
        }
    }
}

/// Append-only sink shared by workers.
///
/// Also hands out the run's sequence numbers, so "started before" and
/// "finished before" comparisons hold across threads.
#[derive(Debug, Default)]
pub struct ReportSink {
    inner: Mutex<SinkState>,
    clock: AtomicU64,
}

#[derive(Debug, Default)]
struct SinkState {
    outcomes: Vec<Outcome>,
    recorded: HashSet<Identity>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Appends an outcome. A second outcome for the same object is dropped.
    pub fn record(&self, outcome: Outcome) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !state.recorded.insert(outcome.identity.clone()) {
            log::error!("Outcome for {} recorded twice; keeping the first", outcome.identity);
            return false;
        }
        state.outcomes.push(outcome);
        true
    }

    pub fn is_recorded(&self, identity: &Identity) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recorded
            .contains(identity)
    }

    /// Outcomes in completion order.
    pub fn into_outcomes(self) -> Vec<Outcome> {
        let mut outcomes = self
            .inner
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .outcomes;
        outcomes.sort_by_key(|o| o.finished);
        outcomes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub safe_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plan: Classification,
    pub outcomes: Vec<Outcome>,
    pub file_errors: Vec<FileError>,
    pub rejected: Vec<RejectedObject>,
    pub warnings: Vec<String>,
    pub interrupted: bool,
    pub timed_out: bool,
}

impl RunReport {
    pub fn new(dry_run: bool, safe_mode: bool) -> Self {
        let now = Utc::now();
        Self {
            dry_run,
            safe_mode,
            started_at: now,
            finished_at: now,
            plan: Classification::default(),
            outcomes: Vec::new(),
            file_errors: Vec::new(),
            rejected: Vec::new(),
            warnings: Vec::new(),
            interrupted: false,
            timed_out: false,
        }
    }

    pub fn outcome(&self, identity: &Identity) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| &o.identity == identity)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                Status::Succeeded => summary.succeeded += 1,
                Status::Failed => summary.failed += 1,
                Status::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.file_errors.is_empty() || self.outcomes.iter().any(|o| o.status == Status::Failed)
    }

    /// `0` for a clean run, `1` when anything failed or the deadline cut the
    /// run short, `130` after an interrupt.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.has_failures() || self.timed_out {
            1
        } else {
            0
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary. No-op outcomes are only counted.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut mode = Vec::new();
        if self.dry_run {
            mode.push("dry run");
        }
        if self.safe_mode {
            mode.push("safe mode");
        }
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        let _ = write!(out, "Run finished in {:.1}s", elapsed);
        if !mode.is_empty() {
            let _ = write!(out, " ({})", mode.join(", "));
        }
        out.push('\n');

        let width = self
            .outcomes
            .iter()
            .map(|o| o.identity.to_string().len())
            .max()
            .unwrap_or(0);
        for outcome in self.outcomes.iter().filter(|o| {
            o.kind != OperationKind::NoOp || o.status != Status::Succeeded
        }) {
            let _ = write!(
                out,
                "  {:<7} {:<width$}  {}",
                outcome.kind.to_string(),
                outcome.identity.to_string(),
                outcome.detail(),
                width = width
            );
            if !outcome.changed_fields.is_empty() {
                let _ = write!(out, " [{}]", outcome.changed_fields.join(", "));
            }
            out.push('\n');
        }

        if !self.file_errors.is_empty() {
            out.push_str("File errors:\n");
            for error in &self.file_errors {
                let _ = writeln!(out, "  {}: {}", error.path.display(), error.message);
            }
        }
        if !self.rejected.is_empty() {
            out.push_str("Ignored backend objects:\n");
            for rejected in &self.rejected {
                let _ = writeln!(
                    out,
                    "  {} {}: {}",
                    rejected.object_type, rejected.handle, rejected.reason
                );
            }
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "Warning: {}", warning);
        }
        if self.interrupted {
            out.push_str("Run was interrupted; remaining operations were skipped.\n");
        } else if self.timed_out {
            out.push_str("Run deadline expired; remaining operations were skipped.\n");
        }

        let summary = self.summary();
        let _ = writeln!(
            out,
            "Summary: {} succeeded, {} failed, {} skipped; planned {} create, {} update, {} delete, {} unchanged",
            summary.succeeded,
            summary.failed,
            summary.skipped,
            self.plan.create,
            self.plan.update,
            self.plan.delete,
            self.plan.noop
        );
        out
    }
}
