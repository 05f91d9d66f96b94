//! Storage trait definitions for histpurge
//!
//! The purge engine never touches build records directly. Everything it
//! needs from the outside world goes through [`JobStore`]:
//! - resolving an item path to a typed [`Item`]
//! - enumerating container children and multi-branch derived jobs
//! - listing, deleting and renumbering build records ([`Run`]s)
//!
//! The trait is async and backend-agnostic. An in-memory fake lives in the
//! `fakes` module and a directory-tree backend in `fs_store`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ItemPath
// ---------------------------------------------------------------------------

/// Slash-separated full name of an item, e.g. `team/service/main`.
///
/// Always holds at least one segment; segments are non-empty and never `.`
/// or `..`, so a path can be joined onto a directory safely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemPath(String);

impl ItemPath {
    /// Path of a direct child of this item.
    pub fn child(&self, name: &str) -> StorageResult<Self> {
        format!("{}/{}", self.0, name).parse()
    }

    /// Iterate over the path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The last segment (the item's own name).
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The enclosing item, or `None` for a top-level item.
    pub fn parent(&self) -> Option<ItemPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| ItemPath(parent.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ItemPath {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        let trimmed = s.trim_matches('/');
        let valid = !trimmed.is_empty()
            && trimmed
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'));
        if !valid {
            return Err(StorageError::InvalidPath(s.to_string()));
        }
        Ok(ItemPath(trimmed.to_string()))
    }
}

impl TryFrom<String> for ItemPath {
    type Error = StorageError;

    fn try_from(s: String) -> StorageResult<Self> {
        s.parse()
    }
}

impl From<ItemPath> for String {
    fn from(path: ItemPath) -> Self {
        path.0
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A node of the job hierarchy, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    /// Leaf that owns build records and a next-build counter.
    Job { path: ItemPath },
    /// Folder-like grouping of nested items.
    Container { path: ItemPath },
    /// Container whose jobs are derived from source branches on demand.
    MultiBranchContainer { path: ItemPath },
    /// Anything else the store knows about but the engine cannot descend into.
    Other { path: ItemPath, kind: String },
}

impl Item {
    pub fn path(&self) -> &ItemPath {
        match self {
            Item::Job { path }
            | Item::Container { path }
            | Item::MultiBranchContainer { path }
            | Item::Other { path, .. } => path,
        }
    }

    /// Short kind label used in logs and reports.
    pub fn kind_name(&self) -> &str {
        match self {
            Item::Job { .. } => "job",
            Item::Container { .. } => "folder",
            Item::MultiBranchContainer { .. } => "multibranch",
            Item::Other { kind, .. } => kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One historical build record of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Build number, unique within the job and never reassigned.
    pub number: u64,
    /// Human-readable name, usually `#<number>`.
    pub display_name: String,
    /// "Keep forever" flag set by users.
    pub protected: bool,
    /// True while the build is still executing.
    pub in_progress: bool,
}

impl Run {
    /// A finished, unprotected run named `#<number>`.
    pub fn new(number: u64) -> Self {
        Self {
            number,
            display_name: format!("#{number}"),
            protected: false,
            in_progress: false,
        }
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn in_progress(mut self, in_progress: bool) -> Self {
        self.in_progress = in_progress;
        self
    }

    /// Display name qualified by the owning job, e.g. `team/api #12`.
    pub fn full_display_name(&self, job: &ItemPath) -> String {
        format!("{} {}", job, self.display_name)
    }
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Access to the job hierarchy and its build history.
///
/// Guarantees:
/// - `list_runs` returns a snapshot in canonical order (newest first).
/// - `delete_run` on a run that no longer exists is a no-op.
/// - `set_next_build_number` to the current value is a no-op.
/// - Job-only operations on a non-job item fail with `WrongKind`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Resolve a path to an item. Returns `ItemNotFound` if absent.
    async fn resolve(&self, path: &ItemPath) -> StorageResult<Item>;

    /// All top-level items.
    async fn root_items(&self) -> StorageResult<Vec<Item>>;

    /// Immediate children of a container.
    async fn children(&self, container: &ItemPath) -> StorageResult<Vec<Item>>;

    /// Jobs currently derived by a multi-branch container, one per branch.
    async fn derived_jobs(&self, container: &ItemPath) -> StorageResult<Vec<ItemPath>>;

    /// Snapshot of a job's runs, newest first.
    async fn list_runs(&self, job: &ItemPath) -> StorageResult<Vec<Run>>;

    /// Permanently delete one run. No-op if it is already gone.
    async fn delete_run(&self, job: &ItemPath, number: u64) -> StorageResult<()>;

    /// Number the next build of this job will receive.
    async fn next_build_number(&self, job: &ItemPath) -> StorageResult<u64>;

    /// Overwrite the next-build counter.
    async fn set_next_build_number(&self, job: &ItemPath, value: u64) -> StorageResult<()>;
}
