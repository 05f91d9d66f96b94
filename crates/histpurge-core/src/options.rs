//! Options controlling a single purge invocation.

use serde::{Deserialize, Serialize};

/// How a purge treats protected runs, containers and the build counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOptions {
    /// Reset the next build number to 1 once a job has no runs left.
    pub reset_next_build_number: bool,
    /// Delete runs marked "keep forever" too.
    pub force: bool,
    /// Descend into folders and multi-branch projects.
    pub recurse: bool,
}

impl PurgeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset_next_build_number = reset;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }
}
