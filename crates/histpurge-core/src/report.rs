//! Aggregated result of a purge.
//!
//! Pure data: the engine fills it in, callers print or serialize it.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use histpurge_state::ItemPath;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::options::PurgeOptions;
use crate::policy::PurgeOutcome;

/// Outcome for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub number: u64,
    pub display_name: String,
    pub outcome: PurgeOutcome,
}

/// Everything that happened to one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Per-run outcomes in the job's canonical (newest first) order.
    pub outcomes: Vec<RunOutcome>,
    /// Runs still present after the purge, if that could be determined.
    pub remaining_runs: Option<usize>,
    /// Whether the next build number was set back to 1.
    pub next_build_number_reset: bool,
}

impl JobReport {
    pub fn count(&self, outcome: PurgeOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}

/// Store operation that failed during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedOperation {
    ListRuns,
    DeleteRun,
    ResetNextBuildNumber,
    ListChildren,
}

/// A store failure isolated to one node (and run, if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub path: ItemPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u64>,
    pub operation: FailedOperation,
    pub message: String,
}

/// Why a node was not descended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotRecursedReason {
    /// A container, but `recurse` was off.
    RecursionDisabled,
    /// An item kind the engine cannot purge or descend into.
    UnsupportedKind,
    /// A top-level item the gate refused during a root-level purge.
    AccessDenied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotRecursed {
    pub path: ItemPath,
    pub kind: String,
    pub reason: NotRecursedReason,
}

/// Aggregated result of one purge invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub purge_id: Uuid,
    pub options: PurgeOptions,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Keyed by job path; processing a job twice keeps the latest result.
    pub jobs: BTreeMap<ItemPath, JobReport>,
    pub not_recursed: Vec<NotRecursed>,
    pub failures: Vec<NodeFailure>,
}

/// Totals over a whole report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeTotals {
    pub jobs: usize,
    pub deleted: usize,
    pub skipped_protected: usize,
    pub skipped_access_denied: usize,
    pub skipped_in_progress: usize,
    pub counters_reset: usize,
    pub not_recursed: usize,
    pub failures: usize,
}

impl PurgeReport {
    pub fn new(options: PurgeOptions) -> Self {
        Self {
            purge_id: Uuid::new_v4(),
            options,
            started_at: Utc::now(),
            finished_at: None,
            jobs: BTreeMap::new(),
            not_recursed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_job(&mut self, job: ItemPath, report: JobReport) {
        self.jobs.insert(job, report);
    }

    pub fn record_not_recursed(&mut self, path: ItemPath, kind: &str, reason: NotRecursedReason) {
        self.not_recursed.push(NotRecursed {
            path,
            kind: kind.to_string(),
            reason,
        });
    }

    pub fn record_failure(&mut self, failure: NodeFailure) {
        self.failures.push(failure);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn job(&self, path: &ItemPath) -> Option<&JobReport> {
        self.jobs.get(path)
    }

    /// Containers and items that could not be recursed into.
    pub fn unrecursed_count(&self) -> usize {
        self.not_recursed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn totals(&self) -> PurgeTotals {
        let mut totals = PurgeTotals {
            jobs: self.jobs.len(),
            not_recursed: self.not_recursed.len(),
            failures: self.failures.len(),
            ..PurgeTotals::default()
        };
        for job in self.jobs.values() {
            if job.next_build_number_reset {
                totals.counters_reset += 1;
            }
            for run in &job.outcomes {
                match run.outcome {
                    PurgeOutcome::Deleted => totals.deleted += 1,
                    PurgeOutcome::SkippedProtected => totals.skipped_protected += 1,
                    PurgeOutcome::SkippedAccessDenied => totals.skipped_access_denied += 1,
                    PurgeOutcome::SkippedInProgress => totals.skipped_in_progress += 1,
                }
            }
        }
        totals
    }

    /// Plain-text summary for terminals.
    pub fn render_text(&self) -> String {
        let totals = self.totals();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Purge {}: {} job(s), {} deleted, {} skipped, {} failure(s)",
            self.purge_id,
            totals.jobs,
            totals.deleted,
            totals.skipped_protected + totals.skipped_access_denied + totals.skipped_in_progress,
            totals.failures,
        );
        for (path, job) in &self.jobs {
            let _ = writeln!(
                out,
                "  {path}: {} deleted, {} kept{}",
                job.count(PurgeOutcome::Deleted),
                job.outcomes.len() - job.count(PurgeOutcome::Deleted),
                if job.next_build_number_reset {
                    ", next build #1"
                } else {
                    ""
                },
            );
            for run in job.outcomes.iter().filter(|r| r.outcome.is_skip()) {
                let _ = writeln!(out, "    {} {}", run.display_name, run.outcome);
            }
        }
        for item in &self.not_recursed {
            let why = match item.reason {
                NotRecursedReason::RecursionDisabled => "recursion disabled",
                NotRecursedReason::UnsupportedKind => "cannot recurse into this item kind",
                NotRecursedReason::AccessDenied => "access denied",
            };
            let _ = writeln!(out, "  {} ({}): not recursed, {why}", item.path, item.kind);
        }
        for failure in &self.failures {
            match failure.run {
                Some(n) => {
                    let _ = writeln!(out, "  {} #{n}: FAILED {}", failure.path, failure.message);
                }
                None => {
                    let _ = writeln!(out, "  {}: FAILED {}", failure.path, failure.message);
                }
            }
        }
        out
    }
}
