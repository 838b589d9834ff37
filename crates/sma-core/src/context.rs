//! Explicit org context for a batch run.

use serde::{Deserialize, Serialize};

/// Identifies the org a batch run targets.
///
/// Passed explicitly into the store and the orchestrator; each org gets its
/// own database inside the configured namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgContext {
    /// Salesforce org id, or any stable identifier for the org.
    pub org_id: String,
    /// Optional human alias (e.g. `prod`, `uat`).
    pub alias: Option<String>,
}

impl OrgContext {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Label used in logs and batch reports.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.org_id)
    }

    /// Database name for this org, restricted to `[a-z0-9_]`.
    pub fn database_name(&self) -> String {
        let name: String = self
            .org_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();

        if name.is_empty() {
            "default".to_string()
        } else {
            format!("org_{}", name)
        }
    }
}
