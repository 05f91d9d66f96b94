//! histpurge core library
//!
//! Recursive purge of build history over a job hierarchy:
//!
//! - [`RunDeletionPolicy`] decides per run (authorization, in-progress guard,
//!   keep-forever protection).
//! - [`JobPurger`] applies it to one job and resets the next build number
//!   when nothing survives.
//! - [`HierarchyWalker`] descends folders and multi-branch projects.
//! - [`PurgeReport`] collects what happened without aborting on the first
//!   failure.
//!
//! Storage is reached through [`histpurge_state::JobStore`] and permissions
//! through [`AuthorizationGate`].

pub mod acl;
pub mod error;
pub mod gate;
pub mod job;
pub mod obs;
pub mod options;
pub mod policy;
pub mod report;
pub mod telemetry;
pub mod trigger;
pub mod walker;

pub use acl::{AccessPolicy, AccessRule, Effect};
pub use error::{PurgeError, Result};
pub use gate::{AllowAll, AuthorizationGate, CachingGate, FnGate};
pub use job::{JobPurge, JobPurger};
pub use options::PurgeOptions;
pub use policy::{PurgeOutcome, RunDeletionPolicy};
pub use report::{
    FailedOperation, JobReport, NodeFailure, NotRecursed, NotRecursedReason, PurgeReport,
    PurgeTotals, RunOutcome,
};
pub use telemetry::init_tracing;
pub use trigger::{handle_item_purge, handle_root_purge, FormRequest, TriggerResponse};
pub use walker::HierarchyWalker;

pub use histpurge_state::{Item, ItemPath, JobStore, Run};

/// histpurge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
