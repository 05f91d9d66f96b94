//! Depth-first walk over the item hierarchy.
//!
//! | Item                   | `recurse = false`  | `recurse = true`                    |
//! |------------------------|--------------------|-------------------------------------|
//! | `Job`                  | purge the job      | purge the job                       |
//! | `Container`            | report not recursed| walk every child item               |
//! | `MultiBranchContainer` | report not recursed| purge every derived branch job      |
//! | `Other`                | report unsupported | report unsupported                  |
//!
//! Nothing below the entry point aborts the walk: store failures are
//! recorded against the node and its siblings are still processed.

use histpurge_state::{Item, ItemPath, JobStore};
use tracing::Instrument;

use crate::error::{PurgeError, Result};
use crate::gate::AuthorizationGate;
use crate::job::JobPurger;
use crate::obs;
use crate::options::PurgeOptions;
use crate::report::{FailedOperation, NotRecursedReason, NodeFailure, PurgeReport};

/// Walks a hierarchy and purges every job it reaches.
///
/// Holds no state between invocations; construct one per purge.
pub struct HierarchyWalker<'a> {
    store: &'a dyn JobStore,
    gate: &'a dyn AuthorizationGate,
    options: PurgeOptions,
}

impl<'a> HierarchyWalker<'a> {
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

    /// Resolve `root` and purge it.
    ///
    /// Fails only if the root cannot be resolved or the gate refuses to let
    /// it be purged at all; in both cases nothing has been touched.
    pub async fn purge(&self, root: &ItemPath) -> Result<PurgeReport> {
        let item = self.store.resolve(root).await?;
        if !self.gate.can_purge(item.path()) {
            return Err(PurgeError::AccessDenied(root.clone()));
        }
        Ok(self.purge_item(&item).await)
    }

    /// Purge an already-resolved item.
    pub async fn purge_item(&self, item: &Item) -> PurgeReport {
        let mut report = PurgeReport::new(self.options);
        let span = obs::purge_span(report.purge_id, item.path().as_str());
        async {
            obs::emit_purge_started(item.path().as_str(), &self.options);
            self.walk(item, &mut report).await;
            report.finish();
            obs::emit_purge_finished(&report);
        }
        .instrument(span)
        .await;
        report
    }

    /// Purge every top-level item. Top-level containers are always descended
    /// into, whatever `recurse` says; items the gate refuses are recorded as
    /// not recursed and left untouched.
    pub async fn purge_all(&self) -> Result<PurgeReport> {
        let roots = self.store.root_items().await?;
        let walker = HierarchyWalker::new(self.store, self.gate, self.options.with_recurse(true));
        let mut report = PurgeReport::new(walker.options);
        let span = obs::purge_span(report.purge_id, "*");
        async {
            obs::emit_purge_started("*", &walker.options);
            for item in &roots {
                if !walker.gate.can_purge(item.path()) {
                    obs::emit_root_denied(item.path());
                    report.record_not_recursed(
                        item.path().clone(),
                        item.kind_name(),
                        NotRecursedReason::AccessDenied,
                    );
                    continue;
                }
                walker.walk(item, &mut report).await;
            }
            report.finish();
            obs::emit_purge_finished(&report);
        }
        .instrument(span)
        .await;
        Ok(report)
    }

    async fn walk(&self, item: &Item, report: &mut PurgeReport) {
        match item {
            Item::Job { path } => self.purge_job(path, report).await,
            Item::Container { path } => {
                if !self.options.recurse {
                    self.not_recursed(item, report);
                    return;
                }
                match self.store.children(path).await {
                    Ok(children) => {
                        for child in &children {
                            Box::pin(self.walk(child, report)).await;
                        }
                    }
                    Err(e) => self.node_failed(path, e, report),
                }
            }
            Item::MultiBranchContainer { path } => {
                if !self.options.recurse {
                    self.not_recursed(item, report);
                    return;
                }
                // The container itself has no runs or counter; only its
                // branch jobs are purged.
                match self.store.derived_jobs(path).await {
                    Ok(jobs) => {
                        for job in &jobs {
                            self.purge_job(job, report).await;
                        }
                    }
                    Err(e) => self.node_failed(path, e, report),
                }
            }
            Item::Other { path, kind } => {
                obs::emit_unsupported_kind(path, kind);
                report.record_not_recursed(path.clone(), kind, NotRecursedReason::UnsupportedKind);
            }
        }
    }

    async fn purge_job(&self, job: &ItemPath, report: &mut PurgeReport) {
        let purger = JobPurger::new(self.store, self.gate, self.options);
        match purger.purge(job).await {
            Ok(result) => {
                report.record_job(job.clone(), result.report);
                for failure in result.failures {
                    report.record_failure(failure);
                }
            }
            Err(failure) => {
                obs::emit_node_failure(&failure);
                report.record_failure(failure);
            }
        }
    }

    fn not_recursed(&self, item: &Item, report: &mut PurgeReport) {
        obs::emit_not_recursed(item.path(), item.kind_name());
        report.record_not_recursed(
            item.path().clone(),
            item.kind_name(),
            NotRecursedReason::RecursionDisabled,
        );
    }

    fn node_failed(&self, path: &ItemPath, err: impl std::fmt::Display, report: &mut PurgeReport) {
        let failure = NodeFailure {
            path: path.clone(),
            run: None,
            operation: FailedOperation::ListChildren,
            message: err.to_string(),
        };
        obs::emit_node_failure(&failure);
        report.record_failure(failure);
    }
}
