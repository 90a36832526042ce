use camino::Utf8Path;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// File name of the optional tunables file next to the settings file
pub const ENGINE_CONFIG_FILE_NAME: &str = "engine.yaml";

/// Prefix for environment overrides, e.g. `CLEANSWEEP_DEBOUNCE_MS=250`
pub const ENV_PREFIX: &str = "CLEANSWEEP";

#[derive(Error, Debug)]
pub enum EngineConfigError {
    #[error("Failed to load engine configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Engine tunables.
///
/// Resolved in order: built-in defaults, optional `engine.yaml`, then
/// `CLEANSWEEP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Quiet period after the last filesystem event before a scan runs
    pub debounce_ms: u64,

    /// How long a status message stays up before it clears itself
    pub status_duration_ms: u64,

    /// Delay between finishing first-run setup and starting monitoring
    pub first_run_grace_ms: u64,

    /// Queue a scan right after a rule is added
    pub rescan_on_rule_add: bool,

    /// Number of recent moves kept in history
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            status_duration_ms: 5000,
            first_run_grace_ms: 1000,
            rescan_on_rule_add: true,
            history_capacity: crate::models::MAX_RECENT_MOVES,
        }
    }
}

impl EngineConfig {
    /// Load tunables, reading `engine.yaml` from `config_dir` when it exists
    pub fn load(config_dir: Option<&Utf8Path>) -> Result<Self, EngineConfigError> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("debounce_ms", defaults.debounce_ms)?
            .set_default("status_duration_ms", defaults.status_duration_ms)?
            .set_default("first_run_grace_ms", defaults.first_run_grace_ms)?
            .set_default("rescan_on_rule_add", defaults.rescan_on_rule_add)?
            .set_default("history_capacity", defaults.history_capacity as u64)?;

        if let Some(dir) = config_dir {
            let path = dir.join(ENGINE_CONFIG_FILE_NAME);
            builder = builder.add_source(
                config::File::new(path.as_str(), config::FileFormat::Yaml).required(false),
            );
        }

        let loaded: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        let loaded = loaded.sanitized();
        tracing::debug!(?loaded, "Engine configuration resolved");
        Ok(loaded)
    }

    /// Clamp values that would make the engine misbehave
    pub fn sanitized(mut self) -> Self {
        self.history_capacity = self.history_capacity.max(1);
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn status_duration(&self) -> Duration {
        Duration::from_millis(self.status_duration_ms)
    }

    pub fn first_run_grace(&self) -> Duration {
        Duration::from_millis(self.first_run_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.status_duration(), Duration::from_secs(5));
        assert!(config.rescan_on_rule_add);
        assert_eq!(config.history_capacity, 10);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(
            dir.join(ENGINE_CONFIG_FILE_NAME),
            "debounce_ms: 50\nrescan_on_rule_add: false\nhistory_capacity: 0\n",
        )
        .unwrap();

        let config = EngineConfig::load(Some(dir.as_path())).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert!(!config.rescan_on_rule_add);
        assert_eq!(config.history_capacity, 1);
        assert_eq!(config.status_duration_ms, 5000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = EngineConfig::load(Some(dir.as_path())).unwrap();
        assert_eq!(config.first_run_grace_ms, 1000);
    }
}
