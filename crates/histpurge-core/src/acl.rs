//! Path-prefix access policy loaded from JSON.
//!
//! ```json
//! {
//!   "default": "allow",
//!   "rules": [
//!     { "effect": "allow", "prefix": "team-a/sandbox" },
//!     { "effect": "deny",  "prefix": "team-a" }
//!   ]
//! }
//! ```
//!
//! Rules are evaluated first-match-wins. A prefix matches the item itself and
//! everything below it, on segment boundaries (`team-a` does not match
//! `team-ab`).

use std::path::Path;

use histpurge_state::{ItemPath, Run};
use serde::{Deserialize, Serialize};

use crate::error::{PurgeError, Result};
use crate::gate::AuthorizationGate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub effect: Effect,
    pub prefix: String,
}

impl AccessRule {
    pub fn matches(&self, path: &ItemPath) -> bool {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            return true;
        }
        let path = path.as_str();
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Ordered rule list with a fallback effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub default: Effect,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

impl AccessPolicy {
    /// Policy that allows everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, effect: Effect, prefix: impl Into<String>) -> Self {
        self.rules.push(AccessRule {
            effect,
            prefix: prefix.into(),
        });
        self
    }

    /// Read a policy file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PurgeError::InvalidPolicy(format!("{}: {e}", path.display())))
    }

    pub fn effect_for(&self, path: &ItemPath) -> Effect {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| rule.effect)
            .unwrap_or(self.default)
    }
}

impl AuthorizationGate for AccessPolicy {
    fn can_purge(&self, item: &ItemPath) -> bool {
        self.effect_for(item) == Effect::Allow
    }

    fn can_delete(&self, job: &ItemPath, _run: &Run) -> bool {
        self.effect_for(job) == Effect::Allow
    }

    /// Decisions depend only on the job path.
    fn access_scope(&self, job: &ItemPath, _run: &Run) -> Option<String> {
        Some(job.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ItemPath {
        s.parse().unwrap()
    }

    #[test]
    fn prefix_matches_on_segment_boundaries() {
        let rule = AccessRule {
            effect: Effect::Deny,
            prefix: "team-a/".into(),
        };
        assert!(rule.matches(&path("team-a")));
        assert!(rule.matches(&path("team-a/api")));
        assert!(!rule.matches(&path("team-ab")));
        assert!(!rule.matches(&path("other/team-a")));
    }

    #[test]
    fn first_match_wins() {
        let policy = AccessPolicy::allow_all()
            .with_rule(Effect::Allow, "team-a/sandbox")
            .with_rule(Effect::Deny, "team-a");
        assert_eq!(policy.effect_for(&path("team-a/sandbox/x")), Effect::Allow);
        assert_eq!(policy.effect_for(&path("team-a/prod")), Effect::Deny);
        assert_eq!(policy.effect_for(&path("team-b")), Effect::Allow);
    }

    #[test]
    fn default_deny() {
        let policy = AccessPolicy {
            default: Effect::Deny,
            rules: vec![],
        }
        .with_rule(Effect::Allow, "public");
        assert!(policy.can_purge(&path("public/x")));
        assert!(!policy.can_purge(&path("private")));
        assert!(!policy.can_delete(&path("private/job"), &Run::new(1)));
    }

    #[test]
    fn parses_json() {
        let json = r#"{"default":"deny","rules":[{"effect":"allow","prefix":"ci"}]}"#;
        let policy: AccessPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.default, Effect::Deny);
        assert_eq!(policy.rules.len(), 1);

        let empty: AccessPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, AccessPolicy::allow_all());
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("acl.json");
        std::fs::write(&file, "{not json").unwrap();
        assert!(matches!(
            AccessPolicy::load(&file),
            Err(PurgeError::InvalidPolicy(_))
        ));
        assert!(matches!(
            AccessPolicy::load(&dir.path().join("missing.json")),
            Err(PurgeError::Io(_))
        ));
    }
}
