//! Authorization checks consulted before anything is deleted.
//!
//! The engine does not know how users are authenticated. It only asks an
//! [`AuthorizationGate`] two questions: may this item be purged at all, and
//! may this particular run be deleted.

use histpurge_state::{ItemPath, Run};

/// Answers delete-permission questions. Implementations must be side-effect free.
pub trait AuthorizationGate: Send + Sync {
    /// Coarse check made once by entry points before any work starts.
    fn can_purge(&self, item: &ItemPath) -> bool;

    /// Whether `run` of `job` may be deleted.
    fn can_delete(&self, job: &ItemPath, run: &Run) -> bool;

    /// Identity the delete decision depends on. Runs sharing a scope are
    /// guaranteed to get the same answer from `can_delete`.
    ///
    /// Defaults to `None`, which means "per run" and disables caching.
    fn access_scope(&self, _job: &ItemPath, _run: &Run) -> Option<String> {
        None
    }
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationGate for AllowAll {
    fn can_purge(&self, _item: &ItemPath) -> bool {
        true
    }

    fn can_delete(&self, _job: &ItemPath, _run: &Run) -> bool {
        true
    }

    fn access_scope(&self, _job: &ItemPath, _run: &Run) -> Option<String> {
        Some(String::new())
    }
}

/// Gate backed by a closure over `(job, run)`; `can_purge` always allows.
pub struct FnGate<F>(pub F);

impl<F> AuthorizationGate for FnGate<F>
where
    F: Fn(&ItemPath, &Run) -> bool + Send + Sync,
{
    fn can_purge(&self, _item: &ItemPath) -> bool {
        true
    }

    fn can_delete(&self, job: &ItemPath, run: &Run) -> bool {
        (self.0)(job, run)
    }
}

/// Remembers the last decision and reuses it while consecutive runs share an
/// access scope. Decisions are identical to asking the inner gate every time.
pub struct CachingGate<'a> {
    inner: &'a dyn AuthorizationGate,
    last: Option<(String, bool)>,
    evaluations: usize,
}

impl<'a> CachingGate<'a> {
    pub fn new(inner: &'a dyn AuthorizationGate) -> Self {
        Self {
            inner,
            last: None,
            evaluations: 0,
        }
    }

    pub fn can_delete(&mut self, job: &ItemPath, run: &Run) -> bool {
        let Some(scope) = self.inner.access_scope(job, run) else {
            self.evaluations += 1;
            return self.inner.can_delete(job, run);
        };
        if let Some((cached_scope, allowed)) = &self.last {
            if *cached_scope == scope {
                return *allowed;
            }
        }
        self.evaluations += 1;
        let allowed = self.inner.can_delete(job, run);
        self.last = Some((scope, allowed));
        allowed
    }

    /// How many times the inner gate was actually consulted.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}
