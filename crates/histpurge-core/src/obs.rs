//! Structured tracing events for the purge lifecycle.
//!
//! Every event carries an `event` field (`purge.started`, `run.deleted`, ...)
//! so logs can be filtered without parsing messages. Set `HISTPURGE_LOG` to
//! adjust verbosity.

use histpurge_state::{ItemPath, Run};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::options::PurgeOptions;
use crate::policy::PurgeOutcome;
use crate::report::{NodeFailure, PurgeReport};

/// Span covering one purge invocation. Attach it with
/// `tracing::Instrument::instrument` so it follows the walk across awaits.
pub fn purge_span(purge_id: Uuid, root: &str) -> Span {
    tracing::info_span!("histpurge.purge", purge_id = %purge_id, root = %root)
}

/// Emit event: `purge.started`.
pub fn emit_purge_started(root: &str, options: &PurgeOptions) {
    info!(
        event = "purge.started",
        root = %root,
        reset = options.reset_next_build_number,
        force = options.force,
        recurse = options.recurse,
    );
}

/// Emit event: `purge.finished` with the report totals.
pub fn emit_purge_finished(report: &PurgeReport) {
    let totals = report.totals();
    info!(
        event = "purge.finished",
        jobs = totals.jobs,
        deleted = totals.deleted,
        skipped_protected = totals.skipped_protected,
        skipped_access_denied = totals.skipped_access_denied,
        skipped_in_progress = totals.skipped_in_progress,
        not_recursed = totals.not_recursed,
        failures = totals.failures,
    );
}

/// Emit event: `job.started`.
pub fn emit_job_started(job: &ItemPath, runs: usize) {
    info!(event = "job.started", job = %job, runs = runs);
}

/// Emit event: `run.deleted` or `run.skipped`, by outcome.
pub(crate) fn emit_run_evaluated(job: &ItemPath, run: &Run, outcome: PurgeOutcome) {
    let name = run.full_display_name(job);
    match outcome {
        PurgeOutcome::Deleted => info!(event = "run.deleted", run = %name),
        PurgeOutcome::SkippedAccessDenied => {
            warn!(event = "run.skipped", run = %name, reason = "access_denied")
        }
        PurgeOutcome::SkippedInProgress => {
            info!(event = "run.skipped", run = %name, reason = "in_progress")
        }
        PurgeOutcome::SkippedProtected => {
            debug!(event = "run.skipped", run = %name, reason = "keep_forever")
        }
    }
}

/// Emit event: `job.next_build_reset`.
pub fn emit_next_build_reset(job: &ItemPath) {
    info!(event = "job.next_build_reset", job = %job);
}

/// Emit event: `job.reset_withheld` when surviving runs block the reset.
pub fn emit_reset_withheld(job: &ItemPath, remaining: usize) {
    info!(event = "job.reset_withheld", job = %job, remaining = remaining);
}

/// Emit event: `item.not_recursed`.
pub fn emit_not_recursed(path: &ItemPath, kind: &str) {
    info!(event = "item.not_recursed", path = %path, kind = %kind);
}

/// Emit event: `item.unsupported`.
pub fn emit_unsupported_kind(path: &ItemPath, kind: &str) {
    warn!(event = "item.unsupported", path = %path, kind = %kind, "cannot recurse into item");
}

/// Emit event: `item.access_denied` for a refused top-level item.
pub fn emit_root_denied(path: &ItemPath) {
    warn!(event = "item.access_denied", path = %path);
}

/// Emit event: `node.failed`.
pub fn emit_node_failure(failure: &NodeFailure) {
    warn!(
        event = "node.failed",
        path = %failure.path,
        run = ?failure.run,
        operation = ?failure.operation,
        error = %failure.message,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_span_create() {
        // Creating and entering the span must not panic without a subscriber.
        let span = purge_span(Uuid::new_v4(), "team");
        let _guard = span.enter();
        emit_purge_started("team", &PurgeOptions::new());
    }
}
