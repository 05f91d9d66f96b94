//! Per-run deletion policy.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. not authorized          → [`PurgeOutcome::SkippedAccessDenied`]
//! 2. still building          → [`PurgeOutcome::SkippedInProgress`] (even with `force`)
//! 3. protected, no `force`   → [`PurgeOutcome::SkippedProtected`]
//! 4. otherwise               → delete, [`PurgeOutcome::Deleted`]
//!
//! An in-progress protected run is reported as in progress, not protected.

use std::fmt;

use histpurge_state::{ItemPath, JobStore, Run, StorageResult};
use serde::{Deserialize, Serialize};

use crate::gate::CachingGate;
use crate::obs;
use crate::options::PurgeOptions;

/// What happened to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeOutcome {
    Deleted,
    SkippedProtected,
    SkippedAccessDenied,
    SkippedInProgress,
}

impl PurgeOutcome {
    pub fn is_skip(self) -> bool {
        self != PurgeOutcome::Deleted
    }
}

impl fmt::Display for PurgeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PurgeOutcome::Deleted => "deleted",
            PurgeOutcome::SkippedProtected => "skipped (keep forever)",
            PurgeOutcome::SkippedAccessDenied => "skipped (access denied)",
            PurgeOutcome::SkippedInProgress => "skipped (in progress)",
        })
    }
}

/// Applies [`PurgeOptions`] to individual runs.
#[derive(Debug, Clone, Copy)]
pub struct RunDeletionPolicy {
    options: PurgeOptions,
}

impl RunDeletionPolicy {
    pub fn new(options: PurgeOptions) -> Self {
        Self { options }
    }

    /// Pure decision for a run whose authorization is already known.
    /// `Deleted` here means "should be deleted".
    pub fn decide(&self, authorized: bool, run: &Run) -> PurgeOutcome {
        if !authorized {
            PurgeOutcome::SkippedAccessDenied
        } else if run.in_progress {
            PurgeOutcome::SkippedInProgress
        } else if run.protected && !self.options.force {
            PurgeOutcome::SkippedProtected
        } else {
            PurgeOutcome::Deleted
        }
    }

    /// Decide and, when the verdict is `Deleted`, ask the store to delete the
    /// run. A store error means the run was not deleted.
    pub async fn evaluate(
        &self,
        store: &dyn JobStore,
        gate: &mut CachingGate<'_>,
        job: &ItemPath,
        run: &Run,
    ) -> StorageResult<PurgeOutcome> {
        let authorized = gate.can_delete(job, run);
        let outcome = self.decide(authorized, run);
        if outcome == PurgeOutcome::Deleted {
            store.delete_run(job, run.number).await?;
        }
        obs::emit_run_evaluated(job, run, outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(force: bool) -> RunDeletionPolicy {
        RunDeletionPolicy::new(PurgeOptions::new().with_force(force))
    }

    #[test]
    fn unprotected_finished_run_is_deleted() {
        assert_eq!(policy(false).decide(true, &Run::new(1)), PurgeOutcome::Deleted);
    }

    #[test]
    fn protected_run_needs_force() {
        let run = Run::new(1).protected(true);
        assert_eq!(policy(false).decide(true, &run), PurgeOutcome::SkippedProtected);
        assert_eq!(policy(true).decide(true, &run), PurgeOutcome::Deleted);
    }

    #[test]
    fn in_progress_wins_over_force_and_protection() {
        let run = Run::new(1).protected(true).in_progress(true);
        for force in [false, true] {
            assert_eq!(policy(force).decide(true, &run), PurgeOutcome::SkippedInProgress);
        }
    }

    #[test]
    fn access_denied_is_checked_first() {
        let run = Run::new(1).protected(true).in_progress(true);
        for force in [false, true] {
            assert_eq!(
                policy(force).decide(false, &run),
                PurgeOutcome::SkippedAccessDenied
            );
        }
    }

    #[test]
    fn outcome_display() {
        assert_eq!(PurgeOutcome::Deleted.to_string(), "deleted");
        assert!(PurgeOutcome::SkippedInProgress.is_skip());
        assert!(!PurgeOutcome::Deleted.is_skip());
    }
}
