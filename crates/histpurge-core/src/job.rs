//! Purging the run history of a single job.

use histpurge_state::{ItemPath, JobStore};

use crate::gate::{AuthorizationGate, CachingGate};
use crate::obs;
use crate::options::PurgeOptions;
use crate::policy::RunDeletionPolicy;
use crate::report::{FailedOperation, JobReport, NodeFailure, RunOutcome};

/// Result of purging one job. Failures are isolated to single runs or to the
/// counter reset; the rest of the job is still processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPurge {
    pub report: JobReport,
    pub failures: Vec<NodeFailure>,
}

/// Applies [`RunDeletionPolicy`] to every run of a job, then optionally
/// resets the job's next build number.
///
/// Holds no state of its own; build one per call.
pub struct JobPurger<'a> {
    store: &'a dyn JobStore,
    gate: &'a dyn AuthorizationGate,
    options: PurgeOptions,
}

impl<'a> JobPurger<'a> {
    pub fn new(
        store: &'a dyn JobStore,
        gate: &'a dyn AuthorizationGate,
        options: PurgeOptions,
    ) -> Self {
        Self {
            store,
            gate,
            options,
        }
    }

    /// Purge `job`. Returns `Err` only when its runs cannot even be listed,
    /// in which case nothing was touched.
    pub async fn purge(&self, job: &ItemPath) -> Result<JobPurge, NodeFailure> {
        // Iterate a snapshot; deletions below must not shift the listing.
        let runs = self
            .store
            .list_runs(job)
            .await
            .map_err(|e| failure(job, None, FailedOperation::ListRuns, e))?;
        obs::emit_job_started(job, runs.len());

        let policy = RunDeletionPolicy::new(self.options);
        let mut gate = CachingGate::new(self.gate);
        let mut result = JobPurge::default();

        for run in &runs {
            match policy.evaluate(self.store, &mut gate, job, run).await {
                Ok(outcome) => result.report.outcomes.push(RunOutcome {
                    number: run.number,
                    display_name: run.display_name.clone(),
                    outcome,
                }),
                Err(e) => {
                    let f = failure(job, Some(run.number), FailedOperation::DeleteRun, e);
                    obs::emit_node_failure(&f);
                    result.failures.push(f);
                }
            }
        }

        // The reset decision uses the store's view of what survived.
        let remaining = match self.store.list_runs(job).await {
            Ok(runs) => Some(runs.len()),
            Err(e) => {
                let f = failure(job, None, FailedOperation::ListRuns, e);
                obs::emit_node_failure(&f);
                result.failures.push(f);
                None
            }
        };
        result.report.remaining_runs = remaining;

        if self.options.reset_next_build_number {
            match remaining {
                Some(0) => match self.store.set_next_build_number(job, 1).await {
                    Ok(()) => {
                        result.report.next_build_number_reset = true;
                        obs::emit_next_build_reset(job);
                    }
                    Err(e) => {
                        let f = failure(job, None, FailedOperation::ResetNextBuildNumber, e);
                        obs::emit_node_failure(&f);
                        result.failures.push(f);
                    }
                },
                // Surviving runs keep their numbers.
                Some(n) => obs::emit_reset_withheld(job, n),
                None => {}
            }
        }

        Ok(result)
    }
}

fn failure(
    job: &ItemPath,
    run: Option<u64>,
    operation: FailedOperation,
    err: impl std::fmt::Display,
) -> NodeFailure {
    NodeFailure {
        path: job.clone(),
        run,
        operation,
        message: err.to_string(),
    }
}
