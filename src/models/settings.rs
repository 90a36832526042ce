use crate::models::rule::{OrganizingRule, RuleError};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted snapshot written to `CleanSweepSettings.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub rules: Vec<OrganizingRule>,

    pub watched_folder_path: Utf8PathBuf,

    #[serde(default = "Utc::now")]
    pub last_saved: DateTime<Utc>,

    #[serde(default = "default_first_run")]
    pub is_first_run: bool,
}

fn default_first_run() -> bool {
    true
}

impl AppSettings {
    pub fn new(
        rules: Vec<OrganizingRule>,
        watched_folder_path: impl Into<Utf8PathBuf>,
        is_first_run: bool,
    ) -> Self {
        Self {
            rules,
            watched_folder_path: watched_folder_path.into(),
            last_saved: Utc::now(),
            is_first_run,
        }
    }

    /// Check every rule before a write.
    ///
    /// An empty rule list is valid so that first-run state can be saved.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.rules.iter().try_for_each(OrganizingRule::validate)
    }
}
