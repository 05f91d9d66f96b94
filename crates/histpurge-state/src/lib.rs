//! histpurge-state: job store abstraction for histpurge
//!
//! This crate owns everything the purge engine treats as external state:
//! the item hierarchy, the build records of each job and each job's
//! next-build counter.
//!
//! ## Key Components
//!
//! - `JobStore`: async trait the engine talks to
//! - `Item` / `ItemPath` / `Run`: the hierarchy data model
//! - `FsJobStore`: directory-tree backend used by the CLI
//! - `fakes::MemoryJobStore`: in-memory backend for tests

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::{FsJobStore, StoreConfig};
pub use storage_traits::{Item, ItemPath, JobStore, Run, StorageResult};
