//! Directory-tree job store.
//!
//! Layout under the store home:
//!
//! ```text
//! jobs/<name>/config.json              {"kind": "job" | "folder" | "multibranch" | ...}
//! jobs/<name>/nextBuildNumber          decimal integer
//! jobs/<name>/builds/<n>/build.json    {"display_name", "keep_forever", "building"}
//! jobs/<folder>/jobs/<child>/...       folder children
//! jobs/<project>/branches/<branch>/... multi-branch derived jobs
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::StorageError;
use crate::storage_traits::{Item, ItemPath, JobStore, Run, StorageResult};

const CONFIG_FILE: &str = "config.json";
const NEXT_BUILD_FILE: &str = "nextBuildNumber";
const BUILD_FILE: &str = "build.json";

const KIND_JOB: &str = "job";
const KIND_FOLDER: &str = "folder";
const KIND_MULTIBRANCH: &str = "multibranch";
/// Kind reported for an entry whose `config.json` cannot be read.
const KIND_UNREADABLE: &str = "unreadable";

/// Configuration for a filesystem store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory containing the top-level `jobs/` directory
    pub home: PathBuf,
}

impl StoreConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

/// Per-item metadata stored in `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemConfig {
    kind: String,
}

/// Per-build metadata stored in `builds/<n>/build.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BuildRecord {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    keep_forever: bool,
    #[serde(default)]
    building: bool,
}

/// [`JobStore`] over a directory tree.
#[derive(Debug, Clone)]
pub struct FsJobStore {
    jobs_dir: PathBuf,
}

impl FsJobStore {
    /// Open an existing store. Fails if `<home>/jobs` is missing.
    pub async fn open(config: &StoreConfig) -> StorageResult<Self> {
        let jobs_dir = config.home.join("jobs");
        if !fs::metadata(&jobs_dir).await?.is_dir() {
            return Err(StorageError::Corrupt {
                location: jobs_dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { jobs_dir })
    }

    /// Create `<home>/jobs` if needed and open the store.
    pub async fn init(config: &StoreConfig) -> StorageResult<Self> {
        fs::create_dir_all(config.home.join("jobs")).await?;
        Self::open(config).await
    }

    /// Create an item directory with the given kind. The parent must exist.
    pub async fn create_item(&self, path: &ItemPath, kind: &str) -> StorageResult<()> {
        let dir = self.new_item_dir(path).await?;
        fs::create_dir_all(&dir).await?;
        let config = serde_json::to_vec_pretty(&ItemConfig {
            kind: kind.to_string(),
        })?;
        fs::write(dir.join(CONFIG_FILE), config).await?;
        Ok(())
    }

    /// Write a build record for a job and bump its counter past it.
    pub async fn record_build(&self, job: &ItemPath, run: &Run) -> StorageResult<()> {
        let dir = self.job_dir(job).await?;
        let next = self.current_counter(&dir).await?;
        let build_dir = dir.join("builds").join(run.number.to_string());
        fs::create_dir_all(&build_dir).await?;
        let record = BuildRecord {
            display_name: Some(run.display_name.clone()),
            keep_forever: run.protected,
            building: run.in_progress,
        };
        fs::write(build_dir.join(BUILD_FILE), serde_json::to_vec_pretty(&record)?).await?;
        write_counter(&dir, next.max(run.number + 1)).await
    }

    /// Directory for a path that may not exist yet, chosen by the parent's kind.
    async fn new_item_dir(&self, path: &ItemPath) -> StorageResult<PathBuf> {
        match path.parent() {
            None => Ok(self.jobs_dir.join(path.as_str())),
            Some(parent) => {
                let parent_dir = self.item_dir(&parent).await?;
                let sub = match read_kind(&parent_dir).await?.as_str() {
                    KIND_FOLDER => "jobs",
                    KIND_MULTIBRANCH => "branches",
                    other => {
                        return Err(StorageError::WrongKind {
                            path: parent.to_string(),
                            actual: other.to_string(),
                            expected: "container".to_string(),
                        })
                    }
                };
                Ok(parent_dir.join(sub).join(path.name()))
            }
        }
    }

    /// Directory of an existing item.
    async fn item_dir(&self, path: &ItemPath) -> StorageResult<PathBuf> {
        let mut segments = path.segments();
        let first = segments.next().ok_or_else(|| StorageError::not_found(path))?;
        let mut dir = self.jobs_dir.join(first);
        for seg in segments {
            let sub = match read_kind(&dir).await {
                Ok(kind) if kind == KIND_MULTIBRANCH => "branches",
                Ok(_) => "jobs",
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    return Err(StorageError::not_found(path))
                }
                Err(e) => return Err(e),
            };
            dir = dir.join(sub).join(seg);
        }
        if !is_dir(&dir).await? {
            return Err(StorageError::not_found(path));
        }
        Ok(dir)
    }

    async fn job_dir(&self, job: &ItemPath) -> StorageResult<PathBuf> {
        let dir = self.item_dir(job).await?;
        let kind = read_kind(&dir).await?;
        if kind != KIND_JOB {
            return Err(StorageError::WrongKind {
                path: job.to_string(),
                actual: kind,
                expected: KIND_JOB.to_string(),
            });
        }
        Ok(dir)
    }

    async fn item_at(&self, path: ItemPath, dir: &Path) -> StorageResult<Item> {
        let kind = match read_kind(dir).await {
            Ok(kind) => kind,
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => "unknown".to_string(),
            Err(e) => return Err(e),
        };
        Ok(item_from_kind(path, kind))
    }

    /// Items in a `jobs/` or `branches/` directory, sorted by name.
    ///
    /// A broken entry never hides its siblings: an unparseable name is
    /// skipped and an unreadable `config.json` yields an `unreadable` item.
    async fn items_in(&self, parent: Option<&ItemPath>, dir: &Path) -> StorageResult<Vec<Item>> {
        let mut items = Vec::new();
        for name in subdirectories(dir).await? {
            let parsed = match parent {
                Some(p) => p.child(&name),
                None => name.parse(),
            };
            let path = match parsed {
                Ok(path) => path,
                Err(e) => {
                    warn!(dir = %dir.display(), entry = %name, error = %e, "skipping entry");
                    continue;
                }
            };
            let item = match self.item_at(path.clone(), &dir.join(&name)).await {
                Ok(item) => item,
                Err(e) => {
                    warn!(path = %path, error = %e, "unreadable item metadata");
                    item_from_kind(path, KIND_UNREADABLE.to_string())
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    /// The stored counter, or one past the newest run when none is stored.
    async fn current_counter(&self, dir: &Path) -> StorageResult<u64> {
        match read_counter(dir).await? {
            Some(next) => Ok(next),
            None => {
                let runs = self.read_runs(dir).await?;
                Ok(runs.first().map(|r| r.number + 1).unwrap_or(1))
            }
        }
    }

    async fn read_runs(&self, dir: &Path) -> StorageResult<Vec<Run>> {
        let builds_dir = dir.join("builds");
        let mut runs = Vec::new();
        for name in subdirectories(&builds_dir).await? {
            // Skip permalink directories such as `lastSuccessfulBuild`.
            let Ok(number) = name.parse::<u64>() else {
                continue;
            };
            let record_path = builds_dir.join(&name).join(BUILD_FILE);
            let record: BuildRecord = match fs::read(&record_path).await {
                Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                    location: record_path.display().to_string(),
                    reason: e.to_string(),
                })?,
                Err(e) if e.kind() == ErrorKind::NotFound => BuildRecord::default(),
                Err(e) => return Err(e.into()),
            };
            runs.push(Run {
                number,
                display_name: record.display_name.unwrap_or_else(|| format!("#{number}")),
                protected: record.keep_forever,
                in_progress: record.building,
            });
        }
        runs.sort_by(|a, b| b.number.cmp(&a.number));
        Ok(runs)
    }
}

fn item_from_kind(path: ItemPath, kind: String) -> Item {
    if kind == KIND_JOB {
        Item::Job { path }
    } else if kind == KIND_FOLDER {
        Item::Container { path }
    } else if kind == KIND_MULTIBRANCH {
        Item::MultiBranchContainer { path }
    } else {
        Item::Other { path, kind }
    }
}

async fn read_counter(dir: &Path) -> StorageResult<Option<u64>> {
    let path = dir.join(NEXT_BUILD_FILE);
    match fs::read_to_string(&path).await {
        Ok(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageError::Corrupt {
                location: path.display().to_string(),
                reason: format!("not a build number: {:?}", text.trim()),
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write-then-rename so readers never see a partial counter.
async fn write_counter(dir: &Path, value: u64) -> StorageResult<()> {
    let tmp = dir.join(format!("{NEXT_BUILD_FILE}.tmp"));
    fs::write(&tmp, value.to_string()).await?;
    fs::rename(&tmp, dir.join(NEXT_BUILD_FILE)).await?;
    Ok(())
}

async fn is_dir(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn read_kind(dir: &Path) -> StorageResult<String> {
    let path = dir.join(CONFIG_FILE);
    let bytes = fs::read(&path).await?;
    let config: ItemConfig = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
        location: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(config.kind)
}

/// Names of the subdirectories of `dir`, sorted. Missing `dir` yields none.
async fn subdirectories(dir: &Path) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl JobStore for FsJobStore {
    #[instrument(skip_all, fields(path = %path))]
    async fn resolve(&self, path: &ItemPath) -> StorageResult<Item> {
        let dir = self.item_dir(path).await?;
        self.item_at(path.clone(), &dir).await
    }

    async fn root_items(&self) -> StorageResult<Vec<Item>> {
        self.items_in(None, &self.jobs_dir).await
    }

    async fn children(&self, container: &ItemPath) -> StorageResult<Vec<Item>> {
        let dir = self.item_dir(container).await?;
        self.items_in(Some(container), &dir.join("jobs")).await
    }

    async fn derived_jobs(&self, container: &ItemPath) -> StorageResult<Vec<ItemPath>> {
        let dir = self.item_dir(container).await?;
        let items = self.items_in(Some(container), &dir.join("branches")).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Item::Job { path } => Some(path),
                _ => None,
            })
            .collect())
    }

    async fn list_runs(&self, job: &ItemPath) -> StorageResult<Vec<Run>> {
        let dir = self.job_dir(job).await?;
        self.read_runs(&dir).await
    }

    #[instrument(skip_all, fields(job = %job))]
    async fn delete_run(&self, job: &ItemPath, number: u64) -> StorageResult<()> {
        let dir = self.job_dir(job).await?;
        // Pin a derived counter first so deleting the newest run cannot lower it.
        if read_counter(&dir).await?.is_none() {
            let next = self.current_counter(&dir).await?;
            write_counter(&dir, next).await?;
        }
        let build_dir = dir.join("builds").join(number.to_string());
        match fs::remove_dir_all(&build_dir).await {
            Ok(()) => {
                debug!(path = %build_dir.display(), "removed build directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn next_build_number(&self, job: &ItemPath) -> StorageResult<u64> {
        let dir = self.job_dir(job).await?;
        self.current_counter(&dir).await
    }

    #[instrument(skip_all, fields(job = %job))]
    async fn set_next_build_number(&self, job: &ItemPath, value: u64) -> StorageResult<()> {
        let dir = self.job_dir(job).await?;
        write_counter(&dir, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> (tempfile::TempDir, FsJobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::init(&StoreConfig::new(dir.path())).await.unwrap();
        (dir, store)
    }

    fn path(s: &str) -> ItemPath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn open_fails_without_jobs_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsJobStore::open(&StoreConfig::new(dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn resolves_nested_kinds() {
        let (_dir, store) = make_store().await;
        store.create_item(&path("team"), "folder").await.unwrap();
        store.create_item(&path("team/api"), "job").await.unwrap();
        store.create_item(&path("team/mb"), "multibranch").await.unwrap();
        store.create_item(&path("team/mb/main"), "job").await.unwrap();
        store.create_item(&path("view"), "list-view").await.unwrap();

        assert_eq!(
            store.resolve(&path("team")).await.unwrap(),
            Item::Container { path: path("team") }
        );
        assert_eq!(
            store.resolve(&path("team/mb/main")).await.unwrap(),
            Item::Job {
                path: path("team/mb/main")
            }
        );
        assert_eq!(
            store.resolve(&path("view")).await.unwrap().kind_name(),
            "list-view"
        );
        assert!(matches!(
            store.resolve(&path("team/nope")).await,
            Err(StorageError::ItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn children_and_derived_jobs_are_separate() {
        let (_dir, store) = make_store().await;
        store.create_item(&path("team"), "folder").await.unwrap();
        store.create_item(&path("team/b"), "job").await.unwrap();
        store.create_item(&path("team/a"), "job").await.unwrap();
        store.create_item(&path("team/mb"), "multibranch").await.unwrap();
        store.create_item(&path("team/mb/dev"), "job").await.unwrap();

        let children: Vec<String> = store
            .children(&path("team"))
            .await
            .unwrap()
            .iter()
            .map(|i| i.path().to_string())
            .collect();
        assert_eq!(children, vec!["team/a", "team/b", "team/mb"]);

        let branches = store.derived_jobs(&path("team/mb")).await.unwrap();
        assert_eq!(branches, vec![path("team/mb/dev")]);
    }

    #[tokio::test]
    async fn runs_are_listed_newest_first_and_skip_permalinks() {
        let (dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        for n in 1..=3 {
            store.record_build(&job, &Run::new(n)).await.unwrap();
        }
        std::fs::create_dir_all(dir.path().join("jobs/api/builds/lastSuccessfulBuild")).unwrap();

        let numbers: Vec<u64> = store
            .list_runs(&job)
            .await
            .unwrap()
            .iter()
            .map(|r| r.number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(store.next_build_number(&job).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn build_flags_round_trip() {
        let (_dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        store
            .record_build(&job, &Run::new(1).protected(true).in_progress(true))
            .await
            .unwrap();
        let runs = store.list_runs(&job).await.unwrap();
        assert!(runs[0].protected);
        assert!(runs[0].in_progress);
        assert_eq!(runs[0].display_name, "#1");
    }

    #[tokio::test]
    async fn delete_run_is_idempotent() {
        let (_dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        store.record_build(&job, &Run::new(1)).await.unwrap();

        store.delete_run(&job, 1).await.unwrap();
        store.delete_run(&job, 1).await.unwrap();
        assert!(store.list_runs(&job).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn next_build_number_defaults_and_persists() {
        let (_dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        assert_eq!(store.next_build_number(&job).await.unwrap(), 1);

        store.set_next_build_number(&job, 42).await.unwrap();
        assert_eq!(store.next_build_number(&job).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn job_operations_reject_folders() {
        let (_dir, store) = make_store().await;
        store.create_item(&path("team"), "folder").await.unwrap();
        assert!(matches!(
            store.list_runs(&path("team")).await,
            Err(StorageError::WrongKind { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_counter_is_reported() {
        let (dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        std::fs::write(dir.path().join("jobs/api/nextBuildNumber"), "soon").unwrap();
        assert!(matches!(
            store.next_build_number(&job).await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn recorded_builds_persist_the_counter() {
        let (dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        for n in 1..=3 {
            store.record_build(&job, &Run::new(n)).await.unwrap();
        }
        let stored = std::fs::read_to_string(dir.path().join("jobs/api/nextBuildNumber")).unwrap();
        assert_eq!(stored, "4");

        store.delete_run(&job, 3).await.unwrap();
        store.delete_run(&job, 2).await.unwrap();
        assert_eq!(store.next_build_number(&job).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn deleting_pins_a_derived_counter() {
        let (dir, store) = make_store().await;
        let job = path("api");
        store.create_item(&job, "job").await.unwrap();
        // Builds copied in by hand, no counter file.
        for n in 1..=3 {
            std::fs::create_dir_all(dir.path().join(format!("jobs/api/builds/{n}"))).unwrap();
        }
        assert_eq!(store.next_build_number(&job).await.unwrap(), 4);

        store.delete_run(&job, 3).await.unwrap();
        assert_eq!(store.next_build_number(&job).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn broken_entries_do_not_hide_siblings() {
        let (dir, store) = make_store().await;
        store.create_item(&path("team"), "folder").await.unwrap();
        for name in ["a", "b", "c"] {
            store
                .create_item(&path(&format!("team/{name}")), "job")
                .await
                .unwrap();
        }
        std::fs::write(dir.path().join("jobs/team/jobs/b/config.json"), "{garbage").unwrap();
        std::fs::create_dir_all(dir.path().join("jobs/team/jobs/we\\ird")).unwrap();

        let children = store.children(&path("team")).await.unwrap();
        let listed: Vec<(String, String)> = children
            .iter()
            .map(|i| (i.path().to_string(), i.kind_name().to_string()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("team/a".to_string(), "job".to_string()),
                ("team/b".to_string(), "unreadable".to_string()),
                ("team/c".to_string(), "job".to_string()),
            ]
        );
    }
}
