//! Form-driven purge trigger.
//!
//! Binds the three checkboxes of the "purge history" form to
//! [`PurgeOptions`], runs the walker and maps the result to a response a web
//! layer can send back. A completed purge always redirects, however many runs
//! were skipped; only an entry-point error turns into a failure.

use histpurge_state::{ItemPath, JobStore};
use serde::{Deserialize, Serialize};

use crate::error::PurgeError;
use crate::gate::AuthorizationGate;
use crate::options::PurgeOptions;
use crate::report::PurgeReport;
use crate::walker::HierarchyWalker;

pub const FIELD_RESET: &str = "resetNextBuild";
pub const FIELD_FORCE: &str = "forceDelete";
pub const FIELD_RECURSE: &str = "recurse";

/// Where to send the user after a successful purge.
pub const REDIRECT_TARGET: &str = "..";

/// Options bound from submitted form fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRequest {
    pub reset_next_build: bool,
    pub force_delete: bool,
    pub recurse: bool,
}

impl FormRequest {
    /// Bind from `(name, value)` pairs with checkbox semantics: a field is
    /// true when present with value `on`, `true` or `1`. Unknown fields are
    /// ignored.
    pub fn from_fields<'f>(fields: impl IntoIterator<Item = (&'f str, &'f str)>) -> Self {
        let mut request = Self::default();
        for (name, value) in fields {
            let checked = matches!(value.to_ascii_lowercase().as_str(), "on" | "true" | "1");
            match name {
                FIELD_RESET => request.reset_next_build = checked,
                FIELD_FORCE => request.force_delete = checked,
                FIELD_RECURSE => request.recurse = checked,
                _ => {}
            }
        }
        request
    }

    pub fn options(&self) -> PurgeOptions {
        PurgeOptions::new()
            .with_reset(self.reset_next_build)
            .with_force(self.force_delete)
            .with_recurse(self.recurse)
    }
}

/// Response for the web layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerResponse {
    Redirect {
        location: String,
        report: Box<PurgeReport>,
    },
    Failure {
        status: u16,
        message: String,
    },
}

impl TriggerResponse {
    fn from_result(result: Result<PurgeReport, PurgeError>) -> Self {
        match result {
            Ok(report) => TriggerResponse::Redirect {
                location: REDIRECT_TARGET.to_string(),
                report: Box::new(report),
            },
            Err(err) => {
                let status = match err {
                    PurgeError::ItemNotFound(_) => 404,
                    PurgeError::AccessDenied(_) => 403,
                    _ => 500,
                };
                TriggerResponse::Failure {
                    status,
                    message: err.to_string(),
                }
            }
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, TriggerResponse::Redirect { .. })
    }
}

/// Purge the item at `target` with options from `form`.
pub async fn handle_item_purge(
    store: &dyn JobStore,
    gate: &dyn AuthorizationGate,
    target: &str,
    form: FormRequest,
) -> TriggerResponse {
    let result = match target.parse::<ItemPath>() {
        Ok(path) => {
            HierarchyWalker::new(store, gate, form.options())
                .purge(&path)
                .await
        }
        Err(e) => Err(e.into()),
    };
    TriggerResponse::from_result(result)
}

/// Purge every top-level item. The form's `recurse` field is ignored: a
/// root-level purge always descends.
pub async fn handle_root_purge(
    store: &dyn JobStore,
    gate: &dyn AuthorizationGate,
    form: FormRequest,
) -> TriggerResponse {
    let result = HierarchyWalker::new(store, gate, form.options())
        .purge_all()
        .await;
    TriggerResponse::from_result(result)
}
