//! In-memory fake job store (testing only)
//!
//! `MemoryJobStore` satisfies the [`JobStore`] contract without touching the
//! filesystem. It can also be told to fail specific operations so callers can
//! exercise their partial-failure handling.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Job,
    Folder,
    MultiBranch,
    Other(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    /// Nested items (folders) or derived branch jobs (multi-branch).
    children: Vec<ItemPath>,
    /// Oldest first internally.
    runs: Vec<Run>,
    next_build_number: u64,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            runs: Vec::new(),
            next_build_number: 1,
        }
    }
}

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    ListRuns,
    DeleteRun,
    SetNextBuildNumber,
    Children,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<ItemPath, Node>,
    roots: Vec<ItemPath>,
    failures: HashSet<(ItemPath, FailOp)>,
}

/// In-memory job hierarchy backed by a `HashMap<ItemPath, Node>`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, path: &str, kind: NodeKind) -> StorageResult<ItemPath> {
        let path: ItemPath = path.parse()?;
        let mut inner = self.lock();
        match path.parent() {
            Some(parent) => {
                let node = inner
                    .nodes
                    .get_mut(&parent)
                    .ok_or_else(|| StorageError::not_found(&parent))?;
                if matches!(node.kind, NodeKind::Job | NodeKind::Other(_)) {
                    return Err(wrong_kind(&parent, &node.kind, "container"));
                }
                node.children.push(path.clone());
            }
            None => inner.roots.push(path.clone()),
        }
        inner.nodes.insert(path.clone(), Node::new(kind));
        Ok(path)
    }

    /// Add a folder. Its parent, if any, must already exist.
    pub fn add_folder(&self, path: &str) -> StorageResult<ItemPath> {
        self.insert(path, NodeKind::Folder)
    }

    /// Add a multi-branch container. Branch jobs are added with [`Self::add_job`]
    /// underneath it and are only visible through `derived_jobs`.
    pub fn add_multibranch(&self, path: &str) -> StorageResult<ItemPath> {
        self.insert(path, NodeKind::MultiBranch)
    }

    /// Add an item of a kind the engine does not understand.
    pub fn add_other(&self, path: &str, kind: &str) -> StorageResult<ItemPath> {
        self.insert(path, NodeKind::Other(kind.to_string()))
    }

    /// Add a job with the given runs. The next build number starts one past
    /// the highest run number.
    pub fn add_job(&self, path: &str, runs: Vec<Run>) -> StorageResult<ItemPath> {
        let path = self.insert(path, NodeKind::Job)?;
        let mut inner = self.lock();
        if let Some(node) = inner.nodes.get_mut(&path) {
            let mut runs = runs;
            runs.sort_by_key(|r| r.number);
            node.next_build_number = runs.last().map(|r| r.number + 1).unwrap_or(1);
            node.runs = runs;
        }
        Ok(path)
    }

    /// Add a job with `count` finished, unprotected runs numbered from 1.
    pub fn add_job_with_builds(&self, path: &str, count: u64) -> StorageResult<ItemPath> {
        self.add_job(path, (1..=count).map(Run::new).collect())
    }

    /// Simulate a new build starting: allocates the next number and records
    /// an in-progress run.
    pub fn start_build(&self, job: &ItemPath) -> StorageResult<u64> {
        let mut inner = self.lock();
        let node = job_node_mut(&mut inner, job)?;
        let number = node.next_build_number;
        node.next_build_number += 1;
        node.runs.push(Run::new(number).in_progress(true));
        Ok(number)
    }

    /// Make every future `op` on `path` fail with `Rejected`.
    pub fn fail_on(&self, path: &ItemPath, op: FailOp) {
        self.lock().failures.insert((path.clone(), op));
    }

    /// Current runs of a job, newest first. Empty if the job is unknown.
    pub fn runs(&self, job: &ItemPath) -> Vec<Run> {
        let inner = self.lock();
        inner
            .nodes
            .get(job)
            .map(|n| n.runs.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Current next-build counter of a job, if it exists.
    pub fn next_build(&self, job: &ItemPath) -> Option<u64> {
        self.lock().nodes.get(job).map(|n| n.next_build_number)
    }

    fn check(inner: &Inner, path: &ItemPath, op: FailOp) -> StorageResult<()> {
        if inner.failures.contains(&(path.clone(), op)) {
            return Err(StorageError::Rejected {
                operation: format!("{op:?}"),
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn to_item(inner: &Inner, path: &ItemPath) -> StorageResult<Item> {
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| StorageError::not_found(path))?;
        let path = path.clone();
        Ok(match &node.kind {
            NodeKind::Job => Item::Job { path },
            NodeKind::Folder => Item::Container { path },
            NodeKind::MultiBranch => Item::MultiBranchContainer { path },
            NodeKind::Other(kind) => Item::Other {
                path,
                kind: kind.clone(),
            },
        })
    }
}

fn job_node<'a>(inner: &'a Inner, job: &ItemPath) -> StorageResult<&'a Node> {
    let node = inner
        .nodes
        .get(job)
        .ok_or_else(|| StorageError::not_found(job))?;
    if node.kind != NodeKind::Job {
        return Err(wrong_kind(job, &node.kind, "job"));
    }
    Ok(node)
}

fn job_node_mut<'a>(inner: &'a mut Inner, job: &ItemPath) -> StorageResult<&'a mut Node> {
    let node = inner
        .nodes
        .get_mut(job)
        .ok_or_else(|| StorageError::not_found(job))?;
    if node.kind != NodeKind::Job {
        return Err(wrong_kind(job, &node.kind, "job"));
    }
    Ok(node)
}

fn wrong_kind(path: &ItemPath, actual: &NodeKind, expected: &str) -> StorageError {
    StorageError::WrongKind {
        path: path.to_string(),
        actual: format!("{actual:?}").to_lowercase(),
        expected: expected.to_string(),
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn resolve(&self, path: &ItemPath) -> StorageResult<Item> {
        let inner = self.lock();
        Self::to_item(&inner, path)
    }

    async fn root_items(&self) -> StorageResult<Vec<Item>> {
        let inner = self.lock();
        inner
            .roots
            .iter()
            .map(|p| Self::to_item(&inner, p))
            .collect()
    }

    async fn children(&self, container: &ItemPath) -> StorageResult<Vec<Item>> {
        let inner = self.lock();
        Self::check(&inner, container, FailOp::Children)?;
        let node = inner
            .nodes
            .get(container)
            .ok_or_else(|| StorageError::not_found(container))?;
        if node.kind != NodeKind::Folder {
            return Err(wrong_kind(container, &node.kind, "folder"));
        }
        node.children
            .iter()
            .map(|p| Self::to_item(&inner, p))
            .collect()
    }

    async fn derived_jobs(&self, container: &ItemPath) -> StorageResult<Vec<ItemPath>> {
        let inner = self.lock();
        Self::check(&inner, container, FailOp::Children)?;
        let node = inner
            .nodes
            .get(container)
            .ok_or_else(|| StorageError::not_found(container))?;
        if node.kind != NodeKind::MultiBranch {
            return Err(wrong_kind(container, &node.kind, "multibranch"));
        }
        Ok(node
            .children
            .iter()
            .filter(|p| matches!(inner.nodes.get(*p), Some(n) if n.kind == NodeKind::Job))
            .cloned()
            .collect())
    }

    async fn list_runs(&self, job: &ItemPath) -> StorageResult<Vec<Run>> {
        let inner = self.lock();
        Self::check(&inner, job, FailOp::ListRuns)?;
        let node = job_node(&inner, job)?;
        Ok(node.runs.iter().rev().cloned().collect())
    }

    async fn delete_run(&self, job: &ItemPath, number: u64) -> StorageResult<()> {
        let mut inner = self.lock();
        Self::check(&inner, job, FailOp::DeleteRun)?;
        let node = job_node_mut(&mut inner, job)?;
        node.runs.retain(|r| r.number != number);
        Ok(())
    }

    async fn next_build_number(&self, job: &ItemPath) -> StorageResult<u64> {
        let inner = self.lock();
        Ok(job_node(&inner, job)?.next_build_number)
    }

    async fn set_next_build_number(&self, job: &ItemPath, value: u64) -> StorageResult<()> {
        let mut inner = self.lock();
        Self::check(&inner, job, FailOp::SetNextBuildNumber)?;
        job_node_mut(&mut inner, job)?.next_build_number = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_job_sets_next_build_after_highest_run() {
        let store = MemoryJobStore::new();
        let job = store
            .add_job("a", vec![Run::new(7), Run::new(3)])
            .unwrap();
        assert_eq!(store.next_build(&job), Some(8));
        let numbers: Vec<u64> = store.runs(&job).iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![7, 3]);
    }

    #[test]
    fn nested_items_require_existing_container_parent() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.add_job("missing/a", vec![]),
            Err(StorageError::ItemNotFound { .. })
        ));
        store.add_job("j", vec![]).unwrap();
        assert!(matches!(
            store.add_job("j/nested", vec![]),
            Err(StorageError::WrongKind { .. })
        ));
    }

    #[test]
    fn start_build_allocates_number() {
        let store = MemoryJobStore::new();
        let job = store.add_job_with_builds("a", 2).unwrap();
        assert_eq!(store.start_build(&job).unwrap(), 3);
        assert!(store.runs(&job)[0].in_progress);
        assert_eq!(store.next_build(&job), Some(4));
    }
}
