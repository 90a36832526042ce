use crate::models::AppSettings;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use thiserror::Error;

/// Name of the per-app folder under the platform data directory
pub const APP_DIR_NAME: &str = "CleanSweep";

/// Primary settings file name
pub const SETTINGS_FILE_NAME: &str = "CleanSweepSettings.yaml";

/// Errors from loading, saving or clearing settings.
///
/// Every variant is recoverable: callers fall back to empty rules and first-run state.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not locate the application data directory")]
    CannotFindAppDataDirectory,

    #[error("Could not create settings directory {path}")]
    CannotCreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not read settings file {path}")]
    CannotReadFile {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not write settings file {path}")]
    CannotWriteFile {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Settings file {path} contains invalid data: {reason}")]
    InvalidData { path: Utf8PathBuf, reason: String },

    #[error("Settings validation failed: {0}")]
    InvalidSettings(String),
}

/// Durable load/save/backup of [`AppSettings`].
///
/// Saving is a small transaction: validate, back up the previous file,
/// write a temp file next to it, then rename it over the primary.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    backup_path: Utf8PathBuf,
}

impl SettingsStore {
    /// Store rooted at an explicit directory. The directory is created on first save.
    pub fn new<P: AsRef<Utf8Path>>(settings_dir: P) -> Self {
        let settings_dir = settings_dir.as_ref().to_path_buf();
        let settings_path = settings_dir.join(SETTINGS_FILE_NAME);
        let backup_path = Utf8PathBuf::from(format!("{}.backup", settings_path));

        Self {
            settings_dir,
            settings_path,
            backup_path,
        }
    }

    /// Store under `<platform data dir>/CleanSweep`
    pub fn from_app_data_dir() -> Result<Self, SettingsError> {
        let data_dir = dirs::data_dir().ok_or(SettingsError::CannotFindAppDataDirectory)?;
        let data_dir = Utf8PathBuf::try_from(data_dir)
            .map_err(|_| SettingsError::CannotFindAppDataDirectory)?;
        Ok(Self::new(data_dir.join(APP_DIR_NAME)))
    }

    /// Load the primary settings file.
    ///
    /// A missing file is not an error and yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<AppSettings>, SettingsError> {
        Self::load_from(&self.settings_path)
    }

    /// Load the `.backup` sibling left by the previous save
    pub fn load_backup(&self) -> Result<Option<AppSettings>, SettingsError> {
        Self::load_from(&self.backup_path)
    }

    fn load_from(path: &Utf8Path) -> Result<Option<AppSettings>, SettingsError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {}", path);
                return Ok(None);
            }
            Err(source) => {
                return Err(SettingsError::CannotReadFile {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings: AppSettings =
            serde_yaml_ng::from_str(&contents).map_err(|e| SettingsError::InvalidData {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Loaded settings from {} ({} rules)",
            path,
            settings.rules.len()
        );
        Ok(Some(settings))
    }

    /// Validate and durably write `settings`.
    ///
    /// The primary file is only replaced after the previous version has been
    /// copied to `.backup` (or there was no previous version). A validation
    /// failure leaves both files untouched.
    pub fn save(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        settings
            .validate()
            .map_err(|e| SettingsError::InvalidSettings(e.to_string()))?;

        let yaml = serde_yaml_ng::to_string(settings)
            .map_err(|e| SettingsError::InvalidSettings(e.to_string()))?;

        self.ensure_settings_dir()?;
        self.create_backup()?;
        self.write_atomically(yaml.as_bytes())?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Delete the primary settings file if present.
    ///
    /// The backup is left in place.
    pub fn clear(&self) -> Result<(), SettingsError> {
        match fs::remove_file(&self.settings_path) {
            Ok(()) => {
                tracing::info!("Cleared settings file {}", self.settings_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SettingsError::CannotWriteFile {
                path: self.settings_path.clone(),
                source,
            }),
        }
    }

    fn ensure_settings_dir(&self) -> Result<(), SettingsError> {
        fs::create_dir_all(&self.settings_dir).map_err(|source| {
            SettingsError::CannotCreateDirectory {
                path: self.settings_dir.clone(),
                source,
            }
        })
    }

    fn create_backup(&self) -> Result<(), SettingsError> {
        if !self.settings_path.exists() {
            return Ok(());
        }

        // fs::copy truncates an existing backup
        fs::copy(&self.settings_path, &self.backup_path).map_err(|source| {
            SettingsError::CannotWriteFile {
                path: self.backup_path.clone(),
                source,
            }
        })?;

        tracing::debug!("Backed up settings to {}", self.backup_path);
        Ok(())
    }

    fn write_atomically(&self, contents: &[u8]) -> Result<(), SettingsError> {
        let write_err = |source: io::Error| SettingsError::CannotWriteFile {
            path: self.settings_path.clone(),
            source,
        };

        // Dropping the temp file on any early return removes it
        let mut temp = tempfile::NamedTempFile::new_in(&self.settings_dir).map_err(write_err)?;
        temp.write_all(contents).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.settings_path)
            .map_err(|e| write_err(e.error))?;

        Ok(())
    }

    pub fn settings_dir(&self) -> &Utf8Path {
        &self.settings_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    pub fn backup_path(&self) -> &Utf8Path {
        &self.backup_path
    }
}
